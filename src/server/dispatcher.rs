//! Routes incoming requests to their handlers and sends the responses.

use std::{
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{debug, error, trace, warn};

use crate::common::{Contact, Message, MessageType, RequestSpecific, ResponseSpecific};
use crate::stats::Counter;
use crate::transport::Transport;

use super::{
    Context, FindNodeRequestHandler, FindValueRequestHandler, PingRequestHandler, RequestHandler,
    StoreRequestHandler,
};

#[derive(Debug)]
/// Entry point of incoming messages.
///
/// Requests from banned hosts are dropped, every other request is handed to
/// its handler, and the handler's response is sent back through the
/// [Transport]. A panicking handler only loses its own request.
pub struct MessageDispatcher {
    context: Arc<Context>,
    transport: Arc<dyn Transport>,

    ping: PingRequestHandler,
    find_node: Arc<FindNodeRequestHandler>,
    find_value: FindValueRequestHandler,
    store: StoreRequestHandler,
}

impl MessageDispatcher {
    pub fn new(context: Arc<Context>, transport: Arc<dyn Transport>) -> Self {
        let find_node = Arc::new(FindNodeRequestHandler::new(context.clone()));

        MessageDispatcher {
            ping: PingRequestHandler::new(context.clone()),
            find_value: FindValueRequestHandler::new(context.clone(), find_node.clone()),
            store: StoreRequestHandler::new(context.clone()),
            find_node,
            context,
            transport,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    // === Public Methods ===

    /// Decode a packet received from `from` and handle it.
    ///
    /// Malformed packets are dropped.
    pub fn handle_bytes(&self, bytes: &[u8], from: SocketAddr) {
        match Message::from_bytes(bytes) {
            Ok(message) => self.handle_message(message.received_from(from)),
            Err(error) => {
                debug!(?from, ?error, "Dropping malformed message");
            }
        }
    }

    /// Handle a decoded message whose sender's source address is set.
    pub fn handle_message(&self, message: Message) {
        let Message {
            transaction_id,
            sender,
            message_type,
        } = message;

        let request = match message_type {
            MessageType::Request(request) => request,
            MessageType::Response(response) => {
                trace!(
                    from = ?sender.observed_address(),
                    ?response,
                    "Ignoring response without a pending request"
                );
                return;
            }
        };

        let from = sender.observed_address();

        if !self.context.host_filter.allow(&from) {
            debug!(
                ?from,
                request_type = request.kind(),
                "Dropping request from banned host"
            );
            self.context.stats.increment(Counter::FilteredRequests);

            return;
        }

        let request_type = request.kind();

        let response = match catch_unwind(AssertUnwindSafe(|| self.route(&sender, request))) {
            Ok(response) => response,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();

                error!(?from, request_type, %reason, "Request handler panicked");
                self.context.stats.increment(Counter::HandlerFailures);

                return;
            }
        };

        if let Some(response) = response {
            self.respond(&sender, transaction_id, response);
        }
    }

    // === Private Methods ===

    fn route(&self, sender: &Contact, request: RequestSpecific) -> Option<ResponseSpecific> {
        match request {
            RequestSpecific::Ping => self.ping.handle_request(sender, ()),
            RequestSpecific::FindNode(arguments) => {
                self.find_node.handle_request(sender, arguments)
            }
            RequestSpecific::FindValue(arguments) => {
                self.find_value.handle_request(sender, arguments)
            }
            RequestSpecific::Store(arguments) => self.store.handle_request(sender, arguments),
        }
    }

    fn respond(&self, requester: &Contact, transaction_id: u32, response: ResponseSpecific) {
        let message = Message {
            transaction_id,
            sender: self.context.local_contact(),
            message_type: MessageType::Response(response),
        };

        if let Err(error) = self.transport.send(requester, message) {
            warn!(
                to = ?requester.observed_address(),
                ?error,
                "Failed to send response"
            );
            self.context.stats.increment(Counter::SendFailures);
        }
    }
}
