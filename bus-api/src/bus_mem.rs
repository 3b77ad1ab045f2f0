use super::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};
use tokio::sync::mpsc;

/// In-process multicast bus used by tests and single-process deployments.
///
/// Clones share the same channel table, so a publisher and its subscribers
/// only need to be handed clones of one instance.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

#[derive(Default)]
struct MemoryBusInner {
    channels: Mutex<HashMap<String, Vec<Sink>>>,
    next_id: AtomicU64,
}

struct Sink {
    id: u64,
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl MemoryBus {
    /// New empty bus.
    pub fn new() -> Self {
        Default::default()
    }

    /// This bus as a boxed `Bus` trait object.
    pub fn boxed(&self) -> DynBus {
        Box::new(self.clone())
    }

    /// Number of live subscriptions across all channels.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .channels
            .lock()
            .unwrap()
            .values()
            .map(|sinks| sinks.len())
            .sum()
    }
}

impl MemoryBusInner {
    fn detach(&self, channel: &str, id: u64) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(sinks) = channels.get_mut(channel) {
            sinks.retain(|sink| sink.id != id);
            if sinks.is_empty() {
                channels.remove(channel);
            }
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &[u8]) -> BusResult<()> {
        let message = BusMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        };
        let mut channels = self.inner.channels.lock().unwrap();
        if let Some(sinks) = channels.get_mut(channel) {
            // also prunes subscribers which went away without detaching
            sinks.retain(|sink| sink.sender.send(message.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<DynSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(Sink { id, sender });
        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            id,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }))
    }
}

struct MemorySubscription {
    channel: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<BusMessage>,
    bus: Weak<MemoryBusInner>,
}

impl MemorySubscription {
    fn detach(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.channel, self.id);
        }
        self.receiver.close();
    }
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    async fn next(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    async fn unsubscribe(&mut self) -> BusResult<()> {
        self.detach();
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
