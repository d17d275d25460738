use std::fmt;
use std::rc::Rc;

use crate::TypeHash;

/// Dotted, fully qualified name of a registered type.
///
/// Cheap to clone; the text is shared.
///
/// # Examples
///
/// ```
/// use opgraph_core::QualifiedName;
///
/// let name = QualifiedName::new("System.IO.Stream");
/// assert_eq!(name.simple_name(), "Stream");
/// assert_eq!(name.namespace(), Some("System.IO"));
/// assert_eq!(name.to_string(), "System.IO.Stream");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName(Rc<str>);

impl QualifiedName {
    /// Create from a dotted name. Leading and trailing dots are ignored.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Rc::from(name.as_ref().trim_matches('.')))
    }

    /// The full dotted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path segment.
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Everything before the last segment, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.rfind('.').map(|pos| &self.0[..pos])
    }

    /// Deterministic identity of the named type.
    pub fn type_hash(&self) -> TypeHash {
        TypeHash::from_name(&self.0)
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_name_has_no_namespace() {
        let name = QualifiedName::new("Widget");
        assert_eq!(name.simple_name(), "Widget");
        assert_eq!(name.namespace(), None);
    }

    #[test]
    fn stray_dots_are_trimmed() {
        assert_eq!(QualifiedName::new(".Demo.Widget."), QualifiedName::new("Demo.Widget"));
    }

    #[test]
    fn hash_follows_text() {
        assert_eq!(
            QualifiedName::new("Demo.Widget").type_hash(),
            TypeHash::from_name("Demo.Widget")
        );
    }
}
