/// The fleet's deployment configuration, kept as opaque text.
///
/// Nothing here interprets the document; it only travels between callers
/// and the repository. An absent document is the empty default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentConfig {
    raw: String,
}

impl DeploymentConfig {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw_data(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}
