use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("room id is empty")]
    Empty,

    #[error("room id is {len} characters long, at most {max} allowed")]
    TooLong { len: usize, max: usize },

    #[error("room id contains invalid character {0:?}")]
    InvalidChar(char),

    #[error("malformed connection id: {0}")]
    MalformedConnectionId(String),
}
