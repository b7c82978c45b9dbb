use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use surge_value::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated `#{{` at byte {offset} in `{template}`")]
    Unterminated { template: String, offset: usize },

    #[error("empty `#{{}}` placeholder in `{0}`")]
    EmptyKey(String),

    #[error("session key `{0}` is not set")]
    MissingKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(Arc<str>),
    Key(Arc<str>),
}

/// A string with `#{key}` placeholders, parsed once and rendered against a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: Arc<str>,
    parts: Arc<[Part]>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = raw;
        let mut consumed = 0usize;

        while let Some(open) = rest.find("#{") {
            if open > 0 {
                parts.push(Part::Literal(Arc::from(&rest[..open])));
            }
            let after = &rest[open + 2..];
            let Some(close) = after.find('}') else {
                return Err(TemplateError::Unterminated {
                    template: raw.to_string(),
                    offset: consumed + open,
                });
            };
            let key = after[..close].trim();
            if key.is_empty() {
                return Err(TemplateError::EmptyKey(raw.to_string()));
            }
            parts.push(Part::Key(Arc::from(key)));

            let advance = open + 2 + close + 1;
            consumed += advance;
            rest = &rest[advance..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(Arc::from(rest)));
        }

        Ok(Self {
            raw: Arc::from(raw),
            parts: parts.into(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template has no placeholders.
    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.parts.iter().filter_map(|p| match p {
            Part::Key(k) => Some(k.as_ref()),
            Part::Literal(_) => None,
        })
    }

    pub fn render(&self, session: &Session) -> Result<String, TemplateError> {
        use std::fmt::Write as _;

        let mut out = String::with_capacity(self.raw.len());
        for part in self.parts.iter() {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Key(k) => {
                    let value = session
                        .get(k)
                        .ok_or_else(|| TemplateError::MissingKey(k.to_string()))?;
                    let _ = write!(out, "{value}");
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Template {
        Template::parse(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn renders_placeholders_of_every_kind() {
        let session = Session::new()
            .set("username", "alice")
            .set("score", 42)
            .set("win", true);
        let t = parse("/getstats/#{username}?score=#{score}&win=#{ win }");
        assert_eq!(
            t.render(&session).as_deref(),
            Ok("/getstats/alice?score=42&win=true")
        );
        assert_eq!(t.keys().collect::<Vec<_>>(), ["username", "score", "win"]);
        assert!(!t.is_static());
    }

    #[test]
    fn static_template_renders_verbatim() {
        let t = parse("/questionsDB?n=10&topic=all");
        assert!(t.is_static());
        assert_eq!(
            t.render(&Session::new()).as_deref(),
            Ok("/questionsDB?n=10&topic=all")
        );
    }

    #[test]
    fn missing_key_is_a_render_error() {
        let t = parse("Bearer #{authToken}");
        assert_eq!(
            t.render(&Session::new()),
            Err(TemplateError::MissingKey("authToken".to_string()))
        );
    }

    #[test]
    fn malformed_templates_fail_to_parse() {
        assert_eq!(
            Template::parse("/games/#{username"),
            Err(TemplateError::Unterminated {
                template: "/games/#{username".to_string(),
                offset: 7,
            })
        );
        assert_eq!(
            Template::parse("a#{ }b"),
            Err(TemplateError::EmptyKey("a#{ }b".to_string()))
        );
    }

    #[test]
    fn lone_hash_and_braces_are_literal() {
        let t = parse("{\"tag\":\"#1\"} #{k}");
        let s = Session::new().set("k", "v");
        assert_eq!(t.render(&s).as_deref(), Ok("{\"tag\":\"#1\"} v"));
    }
}
