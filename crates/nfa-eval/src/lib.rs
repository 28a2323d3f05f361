pub mod evaluator;
pub mod redundancy;

pub use evaluator::RuleEvaluator;
pub use redundancy::{find_redundant_rules, shadows};

// Query evaluation and shadowed-rule detection over parsed rulesets
