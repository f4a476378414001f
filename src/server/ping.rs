use std::sync::Arc;

use tracing::debug;

use crate::common::{Contact, PingResponseArguments, ResponseSpecific};
use crate::stats::Counter;

use super::{Context, RequestHandler};

#[derive(Debug)]
/// Answers pings with the requester's external address.
///
/// While bootstrapping, only collision test pings are answered.
pub struct PingRequestHandler {
    context: Arc<Context>,
}

impl PingRequestHandler {
    pub fn new(context: Arc<Context>) -> Self {
        PingRequestHandler { context }
    }
}

impl RequestHandler for PingRequestHandler {
    type Arguments = ();

    fn handle_request(&self, requester: &Contact, _: ()) -> Option<ResponseSpecific> {
        self.context.stats.increment(Counter::PingRequests);

        if self.context.is_bootstrapping()
            && !requester.is_collision_ping_sender(&self.context.local_contact().key)
        {
            debug!(
                requester = ?requester.key,
                from = ?requester.observed_address(),
                request_type = "ping",
                "Ignoring ping while bootstrapping"
            );
            self.context.stats.increment(Counter::PingsIgnored);

            return None;
        }

        Some(ResponseSpecific::Ping(PingResponseArguments {
            external_address: requester.observed_address(),
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::server::testing::{node, requester};

    #[test]
    fn echoes_external_address() {
        let node = node(Config::default());
        let handler = PingRequestHandler::new(node.context.clone());
        let requester = requester();

        let response = handler.handle_request(&requester, ());

        assert_eq!(
            response,
            Some(ResponseSpecific::Ping(PingResponseArguments {
                external_address: "1.2.3.4:3000".parse().unwrap()
            }))
        );
        assert_eq!(node.stats.get(Counter::PingRequests), 1);
    }

    #[test]
    fn silent_while_bootstrapping() {
        let node = node(Config::default());
        let handler = PingRequestHandler::new(node.context.clone());

        node.context.set_bootstrapping(true);

        assert!(handler.handle_request(&requester(), ()).is_none());
        assert_eq!(node.stats.get(Counter::PingsIgnored), 1);

        node.context.set_bootstrapping(false);
        assert!(handler.handle_request(&requester(), ()).is_some());
    }

    #[test]
    fn collision_ping_while_bootstrapping() {
        let node = node(Config::default());
        let handler = PingRequestHandler::new(node.context.clone());

        node.context.set_bootstrapping(true);

        let mut collider = requester();
        collider.key = node.context.local_contact().key.invert();

        assert!(handler.handle_request(&collider, ()).is_some());
        assert_eq!(node.stats.get(Counter::PingsIgnored), 0);
    }
}
