pub mod dsl;
pub mod evaluator;
pub mod operand;

pub use dsl::{parse_segment, SegmentNode};
pub use evaluator::{evaluate, EvalInput};
