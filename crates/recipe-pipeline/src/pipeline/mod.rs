pub mod modify;
pub mod search;

pub use modify::{ModifyOutcome, ModifyPipelineExecutor, ModifyResult};
pub use search::{SearchOutcome, SearchPipelineExecutor, SearchResult};
