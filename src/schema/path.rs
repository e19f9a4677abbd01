//! Field paths used to locate overlay failures.

use std::fmt;

/// Dotted path from the schema root to the field being overlaid.
///
/// Segments are the static field names emitted by the derive, so pushing a
/// segment never allocates a string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<&'static str>,
}

impl FieldPath {
    /// The empty path, naming the schema root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Descend into `segment`.
    pub fn push(&mut self, segment: &'static str) {
        self.segments.push(segment);
    }

    /// Return to the parent.
    pub fn pop(&mut self) {
        self.segments.pop();
    }

    /// Run `f` with `segment` pushed, popping it again afterwards.
    pub fn scoped<R>(&mut self, segment: &'static str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(segment);
        let out = f(self);
        self.pop();
        out
    }

    /// Segments from the root down.
    pub fn segments(&self) -> &[&'static str] {
        &self.segments
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut path = FieldPath::root();
        assert_eq!(path.to_string(), "<root>");

        path.push("server");
        path.push("tls");
        assert_eq!(path.to_string(), "server.tls");

        path.pop();
        assert_eq!(path.to_string(), "server");
    }

    #[test]
    fn test_scoped_restores() {
        let mut path = FieldPath::root();
        let inner = path.scoped("database", |p| p.scoped("url", |p| p.to_string()));
        assert_eq!(inner, "database.url");
        assert!(path.is_root());
    }
}
