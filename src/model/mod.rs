pub mod amount;
pub mod entity;
pub mod path;
pub mod tenant;
pub mod transfer;

pub use amount::Amount;
pub use entity::{Entity, EntityKind, FlagSeverity, RiskAssessment, RiskFlag, RiskFlagKind, RiskLevel};
pub use path::{CircularFlow, FlowPath, PathNode};
pub use tenant::{
    ApiKey, ApiUsageLog, Plan, PlanTerms, Subscription, SubscriptionStatus, User, UserStatus,
    WebhookEvent,
};
pub use transfer::{
    AccountEntry, EnhancedTransaction, Instruction, NativeTransfer, ParsedTransaction, SwapDirection,
    SwapEvent, SwapInfo, SwapLeg, TokenTransfer, TxType, UpstreamTxTag,
};
