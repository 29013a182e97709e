use std::fmt;
use std::str::FromStr;

/// Short printable identifier, `[A-Za-z0-9][A-Za-z0-9-]*`. Validated on
/// construction; there is no way to build an invalid `NodeId`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("node id must not be empty")]
    Empty,
    #[error("node id {0:?} contains a character outside [A-Za-z0-9-]")]
    InvalidCharacter(String),
}

impl NodeId {
    pub fn new(id: impl Into<String>) -> Result<Self, NodeIdError> {
        let id = id.into();
        let mut chars = id.chars();
        match chars.next() {
            None => return Err(NodeIdError::Empty),
            Some(c) if !c.is_ascii_alphanumeric() => {
                return Err(NodeIdError::InvalidCharacter(id));
            }
            _ => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(NodeIdError::InvalidCharacter(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Ordered, root-first sequence of [`NodeId`]s. Always non-empty.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct NodePath(Vec<NodeId>);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NodePathError {
    #[error("node path must contain at least one node id")]
    Empty,
    #[error(transparent)]
    InvalidElement(#[from] NodeIdError),
}

impl NodePath {
    pub fn new(ids: Vec<NodeId>) -> Result<Self, NodePathError> {
        if ids.is_empty() {
            return Err(NodePathError::Empty);
        }
        Ok(Self(ids))
    }

    pub fn root(id: NodeId) -> Self {
        Self(vec![id])
    }

    pub fn child(&self, id: NodeId) -> Self {
        let mut ids = self.0.clone();
        ids.push(id);
        Self(ids)
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    pub fn first(&self) -> &NodeId {
        &self.0[0]
    }

    /// The tail of the path after the first element, used when walking a
    /// tree one level at a time. Empty once the path has been fully consumed.
    pub fn rest(&self) -> &[NodeId] {
        &self.0[1..]
    }

    /// Basename used for the settings file: node ids joined by `:`.
    pub fn basename(&self) -> String {
        self.0
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(|id| id.as_str().to_string()).collect()
    }

    pub fn from_wire(ids: &[String]) -> Result<Self, NodePathError> {
        let ids = ids
            .iter()
            .map(|s| NodeId::new(s.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ids)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.basename())
    }
}

/// (name, version) pair identifying an interface. Equality compares both
/// fields; no version compatibility is implied.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct InterfaceId {
    pub name: String,
    pub version: u32,
}

impl InterfaceId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl From<&InterfaceId> for crate::gen::InterfaceId {
    fn from(id: &InterfaceId) -> Self {
        crate::gen::InterfaceId {
            name: id.name.clone(),
            version: id.version,
        }
    }
}

impl From<crate::gen::InterfaceId> for InterfaceId {
    fn from(id: crate::gen::InterfaceId) -> Self {
        InterfaceId {
            name: id.name,
            version: id.version,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_id_rejects_empty_and_bad_characters() {
        assert_eq!(NodeId::new(""), Err(NodeIdError::Empty));
        assert!(NodeId::new("-leading-dash").is_err());
        assert!(NodeId::new("has space").is_err());
        assert!(NodeId::new("has_underscore").is_err());
        assert!(NodeId::new("ok-123").is_ok());
    }

    #[test]
    fn node_path_basename_joins_with_colon() {
        let path = NodePath::new(vec![
            NodeId::new("root").unwrap(),
            NodeId::new("child1").unwrap(),
        ])
        .unwrap();
        assert_eq!(path.basename(), "root:child1");
    }

    #[test]
    fn node_path_wire_round_trip() {
        let path = NodePath::new(vec![
            NodeId::new("root").unwrap(),
            NodeId::new("disk0").unwrap(),
        ])
        .unwrap();
        let wire = path.to_wire();
        let parsed = NodePath::from_wire(&wire).unwrap();
        assert_eq!(path, parsed);
    }

    #[test]
    fn node_path_rejects_empty() {
        assert_eq!(NodePath::new(vec![]), Err(NodePathError::Empty));
    }
}
