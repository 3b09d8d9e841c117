pub mod cache;
pub mod chat;
pub mod connections;
pub mod push;

pub use cache::MessageCache;
pub use chat::{
    AssistantDelivery, ChatError, ChatFrame, ChatResult, ChatService, DeliveryStatus, MessagePage,
};
pub use connections::{ConnectionManager, ConnectionRegistry, FrameSender};
pub use push::{PushNotifier, PushOutcome};
