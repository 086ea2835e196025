/// Status line and headers of a gateway response, fixed before any body
/// bytes are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// A head with the given status, content type and `cache-control: no-cache`.
    pub fn new(status: u16, content_type: &str) -> Self {
        Self {
            status,
            headers: vec![
                ("content-type".to_string(), content_type.to_string()),
                ("cache-control".to_string(), "no-cache".to_string()),
            ],
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }
}
