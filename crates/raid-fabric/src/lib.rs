//! Raid Fabric - task dispatch queues and worker collaboration channels

pub mod broker;
pub mod collab;
pub mod dispatch;
pub mod memory;
pub mod redis_broker;

pub use broker::{collab_channel, result_queue, task_queue, Broker, BrokerError, Subscription};
pub use collab::group::{CollabGroup, GroupRestrictions, GroupStatus};
pub use collab::manager::CollabManager;
pub use collab::message::{should_deliver, CollabMessage, CollabMessageType};
pub use dispatch::Dispatcher;
pub use memory::InMemoryBroker;
pub use redis_broker::RedisBroker;
