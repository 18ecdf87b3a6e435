pub mod bulk_loader;
pub mod context;
pub mod queue;
pub mod sink;

pub use bulk_loader::{BulkLoader, LoadSummary};
pub use context::{LoadContext, LoadOptions, ShapePolicy};
pub use queue::{message_key, ChannelQueue, PublishSummary, QueuePublisher, QueueSink, TopicFileQueue};
pub use sink::{
    BoundInsert, ColumnValue, ConsistencyLevel, InsertStatement, JsonLinesSink, MemorySink,
    StorageSink, StoredRow,
};
