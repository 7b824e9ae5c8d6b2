pub mod anova;
pub mod bands;
pub mod studentized_range;
pub mod summary;
pub mod table;
pub mod tukey;

pub use anova::{AnovaResult, FactorialDesign, aggregate_factorial};
pub use bands::{AggregatedBands, aggregate_bands};
pub use summary::{ScenarioSummary, summarize};
pub use table::{KpiCol, KpiTable};
pub use tukey::TukeyComparison;
