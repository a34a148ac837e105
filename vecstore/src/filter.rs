use crate::vecstore::Metadata;

/// Conjunction of metadata conditions applied before ranking.
///
/// The empty filter accepts everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(String, String),
    AnyOf(String, Vec<String>),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `metadata[key] == value`.
    pub fn eq(mut self, key: &str, value: &str) -> Self {
        self.conditions
            .push(Condition::Eq(key.to_string(), value.to_string()));
        self
    }

    /// Require `metadata[key]` to be one of `values`. An empty list is ignored.
    pub fn any_of<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.conditions.push(Condition::AnyOf(key.to_string(), values));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn accepts(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Eq(k, v) => metadata.get(k) == Some(v),
            Condition::AnyOf(k, vs) => metadata.get(k).is_some_and(|m| vs.contains(m)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_accepts_all() {
        assert!(Filter::new().accepts(&Metadata::new()));
    }

    #[test]
    fn test_eq_and_any_of() {
        let m = meta(&[("category", "securities"), ("document_id", "d1")]);
        assert!(Filter::new().eq("document_id", "d1").accepts(&m));
        assert!(!Filter::new().eq("document_id", "d2").accepts(&m));
        assert!(Filter::new()
            .any_of("category", ["financial", "securities"])
            .accepts(&m));
        assert!(!Filter::new()
            .eq("document_id", "d1")
            .any_of("category", ["financial"])
            .accepts(&m));
        assert!(!Filter::new().eq("missing", "x").accepts(&m));
    }

    #[test]
    fn test_empty_any_of_ignored() {
        let f = Filter::new().any_of("category", Vec::<String>::new());
        assert!(f.is_empty());
    }
}
