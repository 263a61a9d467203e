use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDocument {
    pub head: Vec<HeadElement>,
    pub body: String,
    pub scripts: Vec<ScriptElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadElementKind {
    Link,
    Style,
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadElement {
    pub kind: HeadElementKind,
    pub markup: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptElement {
    pub src: Option<String>,
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

impl ScriptElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_module(&self) -> bool {
        if self.attribute("type") == Some("module") {
            return true;
        }
        if self.src.is_some() {
            return false;
        }
        looks_like_module(&self.text)
    }
}

pub fn parse_entry_document(html: &str) -> Result<EntryDocument> {
    let lower = html.to_ascii_lowercase();

    let body = section_inner(html, &lower, "body")
        .ok_or_else(|| anyhow!("entry document has no <body> element"))?;
    let head = match section_inner(html, &lower, "head") {
        Some(head) => scan_head_elements(&head),
        None => Vec::new(),
    };
    let scripts = scan_scripts(html, &lower)?;

    Ok(EntryDocument {
        head,
        body,
        scripts,
    })
}

fn looks_like_module(text: &str) -> bool {
    if text.contains("import(") || text.contains("import.meta") {
        return true;
    }

    let bytes = text.as_bytes();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find("import") {
        let at = cursor + offset;
        let after = at + "import".len();
        let before_ok = at == 0 || bytes[at - 1].is_ascii_whitespace();
        let after_ok = bytes
            .get(after)
            .map(|byte| byte.is_ascii_whitespace())
            .unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        cursor = after;
    }
    false
}

struct TagSpan {
    attrs_start: usize,
    gt: usize,
}

fn find_open_tag(lower: &str, from: usize, name: &str) -> Option<TagSpan> {
    let needle = format!("<{name}");
    let mut cursor = from;
    while let Some(offset) = lower[cursor..].find(&needle) {
        let start = cursor + offset;
        let attrs_start = start + needle.len();
        match lower[attrs_start..].chars().next() {
            Some(next) if next.is_ascii_whitespace() || next == '>' || next == '/' => {
                let gt = find_tag_end(lower, attrs_start)?;
                return Some(TagSpan { attrs_start, gt });
            }
            Some(_) => cursor = attrs_start,
            None => return None,
        }
    }
    None
}

fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut index = from;
    while index < bytes.len() {
        let byte = bytes[index];
        match quote {
            Some(open) => {
                if byte == open {
                    quote = None;
                }
            }
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some(index),
                _ => {}
            },
        }
        index += 1;
    }
    None
}

fn section_inner(html: &str, lower: &str, name: &str) -> Option<String> {
    let open = find_open_tag(lower, 0, name)?;
    let inner_start = open.gt + 1;
    let close = find_close_tag(lower, inner_start, name).unwrap_or(html.len());
    Some(html[inner_start..close].to_string())
}

// A close tag inside script text (e.g. a template string holding "</body>")
// does not end the section, so the scan hops over script elements.
fn find_close_tag(lower: &str, from: usize, name: &str) -> Option<usize> {
    let needle = format!("</{name}");
    let mut cursor = from;
    loop {
        let close_at = cursor + lower[cursor..].find(&needle)?;
        match find_open_tag(lower, cursor, "script") {
            Some(span) if span.attrs_start < close_at => {
                let raw_attrs = &lower[span.attrs_start..span.gt];
                if raw_attrs.trim_end().ends_with('/') {
                    cursor = span.gt + 1;
                    continue;
                }
                let content_start = span.gt + 1;
                let Some(offset) = lower[content_start..].find("</script") else {
                    return Some(close_at);
                };
                let close_start = content_start + offset;
                match find_tag_end(lower, close_start) {
                    Some(close_gt) => cursor = close_gt + 1,
                    None => return Some(close_at),
                }
            }
            _ => return Some(close_at),
        }
    }
}

fn scan_head_elements(head: &str) -> Vec<HeadElement> {
    let lower = head.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut cursor = 0;

    while cursor < lower.len() {
        let Some(offset) = lower[cursor..].find('<') else {
            break;
        };
        let start = cursor + offset;
        let rest = &lower[start..];

        let (kind, name) = if rest.starts_with("<link") {
            (HeadElementKind::Link, "link")
        } else if rest.starts_with("<meta") {
            (HeadElementKind::Meta, "meta")
        } else if rest.starts_with("<style") {
            (HeadElementKind::Style, "style")
        } else {
            cursor = start + 1;
            continue;
        };

        let attrs_start = start + 1 + name.len();
        match lower[attrs_start..].chars().next() {
            Some(next) if next.is_ascii_whitespace() || next == '>' || next == '/' => {}
            _ => {
                cursor = start + 1;
                continue;
            }
        }
        let Some(gt) = find_tag_end(&lower, attrs_start) else {
            break;
        };

        let end = if kind == HeadElementKind::Style {
            let Some(close_offset) = lower[gt..].find("</style") else {
                break;
            };
            let close_start = gt + close_offset;
            match find_tag_end(&lower, close_start) {
                Some(close_gt) => close_gt + 1,
                None => break,
            }
        } else {
            gt + 1
        };

        out.push(HeadElement {
            kind,
            markup: head[start..end].to_string(),
        });
        cursor = end;
    }

    out
}

fn scan_scripts(html: &str, lower: &str) -> Result<Vec<ScriptElement>> {
    let mut out = Vec::new();
    let mut cursor = 0;

    while let Some(span) = find_open_tag(lower, cursor, "script") {
        let raw_attrs = &html[span.attrs_start..span.gt];
        let attributes = parse_attributes(raw_attrs);
        let self_closing = raw_attrs.trim_end().ends_with('/');

        let text = if self_closing {
            cursor = span.gt + 1;
            String::new()
        } else {
            let content_start = span.gt + 1;
            let close_offset = lower[content_start..]
                .find("</script")
                .ok_or_else(|| anyhow!("unterminated <script> element in entry document"))?;
            let close_start = content_start + close_offset;
            let close_gt = find_tag_end(lower, close_start)
                .ok_or_else(|| anyhow!("unterminated </script> tag in entry document"))?;
            cursor = close_gt + 1;
            html[content_start..close_start].to_string()
        };

        let src = attributes
            .iter()
            .find(|(key, _)| key == "src")
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_empty());

        out.push(ScriptElement {
            src,
            text,
            attributes,
        });
    }

    Ok(out)
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        while index < bytes.len() && (bytes[index].is_ascii_whitespace() || bytes[index] == b'/') {
            index += 1;
        }
        if index >= bytes.len() {
            break;
        }

        let name_start = index;
        while index < bytes.len()
            && !bytes[index].is_ascii_whitespace()
            && bytes[index] != b'='
            && bytes[index] != b'/'
        {
            index += 1;
        }
        let name = raw[name_start..index].to_ascii_lowercase();
        if name.is_empty() {
            index += 1;
            continue;
        }

        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }

        if index >= bytes.len() || bytes[index] != b'=' {
            out.push((name, String::new()));
            continue;
        }
        index += 1;
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        if index >= bytes.len() {
            out.push((name, String::new()));
            break;
        }

        let value = match bytes[index] {
            quote @ (b'"' | b'\'') => {
                index += 1;
                let value_start = index;
                while index < bytes.len() && bytes[index] != quote {
                    index += 1;
                }
                let value = raw[value_start..index].to_string();
                if index < bytes.len() {
                    index += 1;
                }
                value
            }
            _ => {
                let value_start = index;
                while index < bytes.len() && !bytes[index].is_ascii_whitespace() {
                    index += 1;
                }
                raw[value_start..index].to_string()
            }
        };
        out.push((name, value));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{parse_entry_document, HeadElementKind, ScriptElement};

    const SAMPLE: &str = concat!(
        "<!doctype html>\n",
        "<html>\n",
        "<head>\n",
        "  <meta charset=\"utf-8\">\n",
        "  <title>App</title>\n",
        "  <link rel=\"stylesheet\" href=\"assets/app.css\">\n",
        "  <style>body { margin: 0; }</style>\n",
        "  <script type=\"module\" src=\"assets/app.js\"></script>\n",
        "</head>\n",
        "<body>\n",
        "  <div id=\"root\">hello</div>\n",
        "  <script src=\"assets/vendor.js\" defer crossorigin=\"anonymous\"></script>\n",
        "  <script>window.ready = true;</script>\n",
        "</body>\n",
        "</html>\n"
    );

    #[test]
    fn parses_head_body_and_scripts_in_document_order() {
        let doc = parse_entry_document(SAMPLE).expect("must parse");

        assert_eq!(doc.head.len(), 3);
        assert_eq!(doc.head[0].kind, HeadElementKind::Meta);
        assert_eq!(doc.head[1].kind, HeadElementKind::Link);
        assert!(doc.head[1].markup.contains("assets/app.css"));
        assert_eq!(doc.head[2].kind, HeadElementKind::Style);
        assert!(doc.head[2].markup.contains("margin: 0"));

        assert!(doc.body.contains("<div id=\"root\">hello</div>"));

        assert_eq!(doc.scripts.len(), 3);
        assert_eq!(doc.scripts[0].src.as_deref(), Some("assets/app.js"));
        assert_eq!(doc.scripts[1].src.as_deref(), Some("assets/vendor.js"));
        assert_eq!(doc.scripts[2].src, None);
        assert_eq!(doc.scripts[2].text.trim(), "window.ready = true;");
    }

    #[test]
    fn script_attributes_are_preserved() {
        let doc = parse_entry_document(SAMPLE).expect("must parse");
        let vendor = &doc.scripts[1];
        assert_eq!(vendor.attribute("defer"), Some(""));
        assert_eq!(vendor.attribute("crossorigin"), Some("anonymous"));
        assert_eq!(vendor.attribute("nomodule"), None);
    }

    #[test]
    fn module_detection() {
        let doc = parse_entry_document(SAMPLE).expect("must parse");
        assert!(doc.scripts[0].is_module());
        assert!(!doc.scripts[1].is_module());
        assert!(!doc.scripts[2].is_module());

        let inline_import = ScriptElement {
            src: None,
            text: "import { boot } from './boot.js';\nboot();".to_string(),
            attributes: Vec::new(),
        };
        assert!(inline_import.is_module());

        let dynamic_import = ScriptElement {
            src: None,
            text: "window.load = () => import('./lazy.js');".to_string(),
            attributes: Vec::new(),
        };
        assert!(dynamic_import.is_module());

        let import_meta = ScriptElement {
            src: None,
            text: "console.log(import.meta.url);".to_string(),
            attributes: Vec::new(),
        };
        assert!(import_meta.is_module());

        let not_a_module = ScriptElement {
            src: None,
            text: "var important = 1; exports.importKind = 'none';".to_string(),
            attributes: Vec::new(),
        };
        assert!(!not_a_module.is_module());
    }

    #[test]
    fn missing_body_is_a_parse_error() {
        let err = parse_entry_document("<html><head></head></html>")
            .expect_err("must reject");
        assert!(err.to_string().contains("no <body>"));
    }

    #[test]
    fn unterminated_script_is_a_parse_error() {
        let html = "<html><body><script src=\"a.js\"></body></html>";
        assert!(parse_entry_document(html).is_err());
    }

    #[test]
    fn quoted_gt_inside_attribute_does_not_end_the_tag() {
        let html = "<html><body><script data-x=\"a>b\" src=\"a.js\"></script></body></html>";
        let doc = parse_entry_document(html).expect("must parse");
        assert_eq!(doc.scripts[0].src.as_deref(), Some("a.js"));
        assert_eq!(doc.scripts[0].attribute("data-x"), Some("a>b"));
    }

    #[test]
    fn body_close_inside_inline_script_does_not_truncate() {
        let html = concat!(
            "<html><body>",
            "<script>var tpl = \"</body></html>\";</script>",
            "<p>tail</p>",
            "</body></html>"
        );
        let doc = parse_entry_document(html).expect("must parse");
        assert!(doc.body.contains("<p>tail</p>"));
        assert_eq!(doc.scripts[0].text, "var tpl = \"</body></html>\";");
    }

    #[test]
    fn body_close_tag_is_optional() {
        let html = "<html><body><p>tail</p>";
        let doc = parse_entry_document(html).expect("must parse");
        assert!(doc.body.contains("tail"));
    }
}
