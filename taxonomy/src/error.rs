use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    /// No decoder is registered for the property kind named in a descriptor.
    #[error("unknown property kind: {0}")]
    UnknownPropertyKind(String),

    /// A descriptor is missing a field its kind requires, or a field has the
    /// wrong shape.
    #[error("malformed `{kind}` property descriptor: {reason}")]
    MalformedPropertyDescriptor { kind: String, reason: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// An `item` value references an id the registry does not hold.
    #[error("dangling item reference: {0}")]
    DanglingReference(String),

    #[error("malformed `{msg_type}` message: {source}")]
    MalformedMessage {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
}
