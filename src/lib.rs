pub mod cli;
pub mod commands;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod exec;
pub mod parsers;
pub mod query;
pub mod sources;
pub mod transform;


pub use config::Config;
pub use detector::Detector;
pub use error::{PtxError, TransformFault};
pub use event::{Event, Row, Value};
pub use exec::{execute, QueryOutput};
pub use parsers::{HttpParser, JsonParser, Parser, SyslogParser, UserRegexConfig, UserRegexParser};
pub use query::{parse_query, Query};
pub use transform::{EvalTransform, Transform, TransformChain};
