#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
        }
    }

    /// Splits `left <op> right` on the first operator. Whitespace is ignored.
    pub(crate) fn split(raw: &str) -> Option<(String, Self, String)> {
        let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

        // Two-character operators first so `<=` is not read as `<`.
        let ops = [
            ("<=", Self::Lte),
            (">=", Self::Gte),
            ("==", Self::Eq),
            ("<", Self::Lt),
            (">", Self::Gt),
        ];
        let (pos, len, op) = ops
            .iter()
            .filter_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
            .min_by_key(|(pos, len, _)| (*pos, std::cmp::Reverse(*len)))?;

        let left = s[..pos].to_string();
        let right = s[pos + len..].to_string();
        Some((left, op, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_prefers_two_char_operators() {
        let (l, op, r) = CompareOp::split(" response_time.p95 <= 1000 ")
            .unwrap_or_else(|| panic!("expected operator"));
        assert_eq!(l, "response_time.p95");
        assert_eq!(op, CompareOp::Lte);
        assert_eq!(r, "1000");

        let (l, op, r) =
            CompareOp::split(">= 0").unwrap_or_else(|| panic!("expected operator"));
        assert_eq!(l, "");
        assert_eq!(op, CompareOp::Gte);
        assert_eq!(r, "0");
    }

    #[test]
    fn split_without_operator_is_none() {
        assert!(CompareOp::split("response_time.max 2000").is_none());
    }

    #[test]
    fn apply_and_display() {
        assert!(CompareOp::Lt.apply(450.0, 500.0));
        assert!(!CompareOp::Lt.apply(600.0, 500.0));
        assert!(CompareOp::Eq.apply(1.0, 1.0));
        assert_eq!(CompareOp::Gte.to_string(), ">=");
        assert_eq!("<".parse::<CompareOp>().ok(), Some(CompareOp::Lt));
    }
}
