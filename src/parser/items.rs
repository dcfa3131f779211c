use indexmap::IndexMap;

/// Builds the `{namespace}local` form used as registry key.
#[must_use]
pub fn qualify(namespace: &str, local_name: &str) -> String {
    format!("{{{namespace}}}{local_name}")
}

/// One structural unit of a workflow document: a start or an end tag.
///
/// Attribute keys keep their document spelling for unprefixed names and the
/// `x:` prefix for the XAML language namespace (`x:Name`, `x:Key`). Any other
/// namespaced attribute is keyed `{namespace}local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    namespace: String,
    local_name: String,
    qname: String,
    attributes: IndexMap<String, String>,
    closing: bool,
}

impl Token {
    pub fn start(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(namespace.into(), local_name.into(), false)
    }

    pub fn end(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(namespace.into(), local_name.into(), true)
    }

    fn new(namespace: String, local_name: String, closing: bool) -> Self {
        let qname = qualify(&namespace, &local_name);
        Self {
            namespace,
            local_name,
            qname,
            attributes: IndexMap::new(),
            closing,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Inserts an attribute. An existing key keeps its position.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn retain_attributes(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.attributes.retain(|key, _| keep(key));
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[must_use]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    #[must_use]
    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// True for a start tag with the given qualified name.
    #[must_use]
    pub fn opens(&self, qname: &str) -> bool {
        !self.closing && self.qname == qname
    }

    /// True for an end tag with the given qualified name.
    #[must_use]
    pub fn closes(&self, qname: &str) -> bool {
        self.closing && self.qname == qname
    }
}
