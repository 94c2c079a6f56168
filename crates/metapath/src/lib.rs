//! Metapath: an XPath 3.1 subset for querying Metaschema-based models.
//!
//! ```
//! use metapath::model::simple::{assembly, document, field};
//! use metapath::{DynamicContext, Item, compile_default};
//!
//! let doc = document()
//!     .child(assembly("catalog").child(field("title", "Sample")).child(field("title", "Other")))
//!     .build();
//! let expr = compile_default("count(catalog/title)").unwrap();
//! let ctx = DynamicContext::default();
//! let result = expr.evaluate(Some(Item::Node(doc)), &ctx).unwrap();
//! assert_eq!(result.first().and_then(Item::as_atomic).map(ToString::to_string).as_deref(), Some("2"));
//! ```
pub mod compiler;
pub mod consts;
pub mod engine;
pub mod model;
pub mod names;
pub mod parser;
pub mod types;
pub mod xdm;

pub use compiler::{CompiledExpression, compile, compile_default};
pub use engine::error::{Error, ErrorCode, Result};
pub use engine::evaluator::{ResultKind, ResultValue, effective_boolean_value};
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Features, FunctionRegistry, StaticContext, StaticContextBuilder,
};
pub use model::{NodeItem, NodeKind};
pub use names::{LexicalName, NameCache, QName};
pub use parser::{ParseError, parse_metapath};
pub use types::{AtomicType, SequenceType};
pub use xdm::{AtomicValue, Item, Sequence};
