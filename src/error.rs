use thiserror::Error;

pub type Result<T, E = DomException> = std::result::Result<T, E>;

/// The failure kinds a DOM operation may report. Mutation errors are raised
/// before any tree change, so a returned error implies an untouched tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomException {
    #[error("index size error: {0}")]
    IndexSize(String),

    #[error("hierarchy request error: {0}")]
    HierarchyRequest(String),

    #[error("wrong document error: {0}")]
    WrongDocument(String),

    #[error("invalid character error: {0}")]
    InvalidCharacter(String),

    #[error("no modification allowed error: {0}")]
    NoModificationAllowed(String),

    #[error("not found error: {0}")]
    NotFound(String),

    #[error("not supported error: {0}")]
    NotSupported(String),

    #[error("attribute in use error: {0}")]
    InUseAttribute(String),

    #[error("invalid state error: {0}")]
    InvalidState(String),

    #[error("namespace error: {0}")]
    Namespace(String),
}

/// XPath failures. Parse failures carry the 0-based character offset of the
/// offending token within the expression text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XPathError {
    #[error("invalid expression at offset {position}: {message}")]
    InvalidExpression { position: usize, message: String },

    #[error("type error: {0}")]
    Type(String),
}

impl XPathError {
    pub fn invalid<M: Into<String>>(position: usize, message: M) -> Self {
        Self::InvalidExpression {
            position,
            message: message.into(),
        }
    }
}

/// Failures while decoding an XML byte stream into a tree.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("xml syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("unknown entity reference: &{0};")]
    UnknownEntity(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] DomException),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
