#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("linking {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },
    #[error("node {id} cannot be linked to itself")]
    SelfLoop { id: String },
    #[error("{child} is already attached to {parent}")]
    MultipleParents { child: String, parent: String },
    #[error("a node with id {id} already exists")]
    DuplicateNode { id: String },
}

pub type Result<T> = std::result::Result<T, GraphError>;
