use std::{fmt::Debug, sync::Arc};

use tracing::trace;

use crate::common::{
    Contact, FindNodeRequestArguments, FindNodeResponseArguments, Key, ResponseSpecific,
};
use crate::stats::Counter;

use super::{Context, RequestHandler};

/// Answers node lookups, also the fallback of value lookups that found
/// nothing.
pub trait NodeLookupResponder: Debug + Send + Sync {
    /// The contacts closest to `target`, and a security token for
    /// `requester` to store values with.
    fn find_node(&self, requester: &Contact, target: &Key) -> FindNodeResponseArguments;
}

#[derive(Debug)]
/// Default [NodeLookupResponder], backed by the routing table.
pub struct FindNodeRequestHandler {
    context: Arc<Context>,
}

impl FindNodeRequestHandler {
    pub fn new(context: Arc<Context>) -> Self {
        FindNodeRequestHandler { context }
    }
}

impl NodeLookupResponder for FindNodeRequestHandler {
    fn find_node(&self, requester: &Contact, target: &Key) -> FindNodeResponseArguments {
        let nodes = self.context.routing.closest(target, self.context.config.k);

        trace!(?target, nodes = nodes.len(), "Closest nodes");

        FindNodeResponseArguments {
            token: self.context.tokens.generate(requester).to_vec(),
            nodes,
        }
    }
}

impl RequestHandler for FindNodeRequestHandler {
    type Arguments = FindNodeRequestArguments;

    fn handle_request(
        &self,
        requester: &Contact,
        arguments: FindNodeRequestArguments,
    ) -> Option<ResponseSpecific> {
        self.context.stats.increment(Counter::FindNodeRequests);

        Some(ResponseSpecific::FindNode(
            self.find_node(requester, &arguments.target),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::routing_table::RoutingView;
    use crate::server::testing::{node, requester};

    #[test]
    fn closest_nodes_and_token() {
        let node = node(Config {
            k: 8,
            ..Default::default()
        });
        let handler = FindNodeRequestHandler::new(node.context.clone());
        let requester = requester();

        for i in 0..16 {
            node.routing.add(Contact::new(
                Key::random(),
                format!("10.0.1.{i}:3000").parse().unwrap(),
            ));
        }

        let target = Key::random();
        let response = handler.handle_request(&requester, FindNodeRequestArguments { target });

        match response {
            Some(ResponseSpecific::FindNode(arguments)) => {
                assert_eq!(arguments.nodes.len(), 8);
                assert_eq!(arguments.nodes, node.routing.closest(&target, 8));
                assert!(node
                    .context
                    .tokens
                    .validate(&requester, Some(arguments.token.as_slice()))
                    .is_ok());
            }
            other => panic!("expected a find_node response, got {other:?}"),
        }

        assert_eq!(node.stats.get(Counter::FindNodeRequests), 1);
    }

    #[test]
    fn empty_routing_table() {
        let node = node(Config::default());
        let handler = FindNodeRequestHandler::new(node.context.clone());

        let response = handler.find_node(&requester(), &Key::random());

        assert!(response.nodes.is_empty());
        assert_eq!(response.token.len(), crate::server::tokens::TOKEN_SIZE);
    }
}
