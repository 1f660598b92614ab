pub mod channel;
pub mod config;
pub mod domain;
pub mod errors;
pub mod matcher;
pub mod ordering;

pub use channel::{ChannelError, InboundEvent, InboundKind, OutboundChannel};
pub use domain::conversation::{Conversation, ConversationId, Message, Role};
pub use domain::order::{Order, OrderId, OrderItem, OrderStatus};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, InterfaceError};
pub use matcher::{MatchCandidate, MatcherConfig, ProductMatcher};
pub use ordering::{
    plan_order, OrderLineRequest, OrderOutcome, OrderPlan, OrderReceipt, ReceiptLine,
    UnavailableItem, UnavailableReason,
};
