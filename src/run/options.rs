/// Engine option string parsed into a typed record at the boundary.
/// The wire keeps the free-form `Name=Value` list for worker compatibility;
/// the scheduler only ever cares about the memory and thread demands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    pub hash: u64,
    pub threads: Option<u64>,
    pub others: Vec<(String, String)>,
}

impl From<&str> for EngineOptions {
    fn from(raw: &str) -> Self {
        let mut options = Self::default();
        for field in raw.split_whitespace() {
            match field.split_once('=') {
                Some(("Hash", value)) => options.hash = value.parse().unwrap_or(0),
                Some(("Threads", value)) => options.threads = value.parse().ok(),
                Some((name, value)) => options
                    .others
                    .push((name.to_string(), value.to_string())),
                None => {}
            }
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hash_and_threads() {
        let o = EngineOptions::from("Hash=128 Threads=4 Contempt=10");
        assert_eq!(o.hash, 128);
        assert_eq!(o.threads, Some(4));
        assert_eq!(o.others, vec![("Contempt".to_string(), "10".to_string())]);
    }

    #[test]
    fn tolerates_empty_and_malformed_fields() {
        let o = EngineOptions::from("");
        assert_eq!(o.hash, 0);
        let o = EngineOptions::from("Hash=big solo");
        assert_eq!(o.hash, 0);
        assert!(o.others.is_empty());
    }
}
