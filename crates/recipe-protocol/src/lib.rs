pub mod frames;

pub use frames::{
    Confirmation, HistoryTurn, InboundFrame, MemberInfo, ModificationEntry, ModificationType,
    OutboundFrame,
};
