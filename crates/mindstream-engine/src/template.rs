//! Message templates with `{name}` placeholders
//!
//! Parsed once at configuration time; rendering cannot fail.

use mindstream_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`. `{{` and `}}` are literal braces; a placeholder name is
    /// one or more ASCII alphanumerics or underscores.
    pub fn parse(component: &str, source: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::invalid_template(component, source, reason);
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(invalid("unclosed '{'"));
                    }
                    if name.is_empty() {
                        return Err(invalid("empty placeholder name"));
                    }
                    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
                        return Err(invalid(&format!("invalid placeholder name {:?}", name)));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(invalid("unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in order of appearance (duplicates kept).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render with `lookup` supplying the text for each placeholder.
    pub fn render<'a>(&self, mut lookup: impl FnMut(&str) -> &'a str) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => out.push_str(lookup(name)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_placeholders() {
        let t = Template::parse("ERPS", "depth {depth} at {coefficient}").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("depth ".into()),
                Segment::Placeholder("depth".into()),
                Segment::Literal(" at ".into()),
                Segment::Placeholder("coefficient".into()),
            ]
        );
        assert_eq!(t.placeholders().collect::<Vec<_>>(), vec!["depth", "coefficient"]);
    }

    #[test]
    fn escaped_braces_are_literal() {
        let t = Template::parse("A", "set {{x}} to {v}").unwrap();
        assert_eq!(t.render(|_| "1"), "set {x} to 1");
    }

    #[test]
    fn plain_text_has_no_placeholders() {
        let t = Template::parse("A", "Consciousness stream processing nominal").unwrap();
        assert_eq!(t.placeholders().count(), 0);
        assert_eq!(t.render(|_| unreachable!()), "Consciousness stream processing nominal");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for bad in ["open {depth", "stray } brace", "empty {} name", "bad {a-b} name"] {
            let err = Template::parse("A", bad).unwrap_err();
            assert!(matches!(err, Error::InvalidTemplate { .. }), "{}: {}", bad, err);
        }
    }
}
