//! Grouping contract for batched inbound items.
//!
//! Items that arrive as part of one user action (the messages of a media
//! album, for instance) carry a shared correlation key and an intrinsic
//! sequence number. The batching managers buffer items by key and restore
//! intrinsic order before handing a settled group to user code.

/// An inbound item that can be grouped with its siblings.
pub trait Correlated: Send + 'static {
    /// Key identifying the group this item belongs to.
    ///
    /// Items sharing a key are buffered into one batch. Items with no
    /// natural group should synthesize a unique key (the modeled API uses
    /// `"{chat_id}_{message_id}"` for standalone messages) so they settle as
    /// singleton batches.
    fn correlation_key(&self) -> String;

    /// Intrinsic position of this item within its group.
    ///
    /// Batches are delivered sorted ascending by this value, whatever order
    /// the items arrived in.
    fn sequence(&self) -> i64;
}

/// Restore intrinsic order before a batch is handed to user code.
pub fn sort_by_sequence<E: Correlated>(items: &mut [E]) {
    items.sort_by_key(|item| item.sequence());
}
