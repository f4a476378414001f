//! Worker threads handling incoming messages off the network thread.

use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};

use flume::{Receiver, Sender};
use tracing::{debug, warn};

use crate::server::dispatcher::MessageDispatcher;
use crate::{Error, Result};

#[derive(Debug)]
enum Job {
    Message(crate::common::Message),
    Packet(Vec<u8>, SocketAddr),
}

#[derive(Debug)]
/// Fixed size pool of threads feeding a [MessageDispatcher].
///
/// Requests are handled in no particular order across workers.
pub struct RequestPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl RequestPool {
    /// Spawn [Config::workers](crate::Config::workers) threads, at least one.
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Result<Self> {
        let (sender, receiver) = flume::unbounded::<Job>();
        let workers = dispatcher.context().config.workers;

        let workers = (0..workers.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                let dispatcher = dispatcher.clone();

                thread::Builder::new()
                    .name(format!("mojito-worker-{i}"))
                    .spawn(move || run(receiver, dispatcher))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(RequestPool {
            sender: Some(sender),
            workers,
        })
    }

    // === Public Methods ===

    /// Queue a decoded message, its sender's source address already set.
    pub fn submit(&self, message: crate::common::Message) -> Result<()> {
        self.send(Job::Message(message))
    }

    /// Queue a raw packet received from `from`.
    pub fn submit_packet(&self, bytes: Vec<u8>, from: SocketAddr) -> Result<()> {
        self.send(Job::Packet(bytes, from))
    }

    /// Handle every queued job, then stop the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    // === Private Methods ===

    fn send(&self, job: Job) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(Error::PoolShutdown)?
            .send(job)
            .map_err(|_| Error::PoolShutdown)
    }

    fn stop(&mut self) {
        // Workers exit once the channel is drained and disconnected.
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Request worker panicked");
            }
        }
    }
}

impl Drop for RequestPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(receiver: Receiver<Job>, dispatcher: Arc<MessageDispatcher>) {
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Message(message) => dispatcher.handle_message(message),
            Job::Packet(bytes, from) => dispatcher.handle_bytes(&bytes, from),
        }
    }

    debug!(thread = ?thread::current().name(), "Request worker stopped");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::{Contact, Key, Message, MessageType, RequestSpecific};
    use crate::config::{Config, DEFAULT_WORKERS};
    use crate::server::testing::{node, requester};
    use crate::transport::ChannelTransport;

    #[test]
    fn handles_all_submitted_messages() {
        let node = node(Config::default());
        let (transport, outbound) = ChannelTransport::new();
        let dispatcher = Arc::new(MessageDispatcher::new(
            node.context.clone(),
            Arc::new(transport),
        ));

        let pool = RequestPool::new(dispatcher).unwrap();
        assert_eq!(pool.workers.len(), DEFAULT_WORKERS);

        for transaction_id in 0..100 {
            pool.submit(Message {
                transaction_id,
                sender: requester(),
                message_type: MessageType::Request(RequestSpecific::Ping),
            })
            .unwrap();
        }

        pool.shutdown();

        let mut transaction_ids: Vec<u32> = outbound
            .drain()
            .map(|outbound| outbound.message.transaction_id)
            .collect();
        transaction_ids.sort();

        assert_eq!(transaction_ids, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn handles_packets() {
        let node = node(Config {
            workers: 1,
            ..Default::default()
        });
        let (transport, outbound) = ChannelTransport::new();
        let dispatcher = Arc::new(MessageDispatcher::new(
            node.context.clone(),
            Arc::new(transport),
        ));

        let pool = RequestPool::new(dispatcher).unwrap();
        assert_eq!(pool.workers.len(), 1);

        let packet = Message {
            transaction_id: 7,
            sender: Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap()),
            message_type: MessageType::Request(RequestSpecific::Ping),
        }
        .to_bytes()
        .unwrap();

        pool.submit_packet(packet, "1.2.3.4:3000".parse().unwrap()).unwrap();
        pool.shutdown();

        let sent = outbound.try_recv().unwrap();
        assert_eq!(sent.message.transaction_id, 7);
        assert_eq!(sent.to, "1.2.3.4:3000".parse::<SocketAddr>().unwrap());
    }
}
