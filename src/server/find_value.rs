use std::sync::Arc;

use tracing::debug;

use crate::common::{
    Contact, FindValueRequestArguments, FindValueResponseArguments, Key, ResponseSpecific, Value,
    ValueType,
};
use crate::server::database::ValueBag;
use crate::stats::Counter;

use super::{Context, NodeLookupResponder, RequestHandler};

#[derive(Debug)]
/// Answers value lookups from the database, falling back to a node lookup
/// when there is nothing to return.
///
/// A first request (no secondary keys) gets the only matching value in
/// full, or the secondary keys of all matching values so the requester can
/// ask for them in a follow up request.
///
/// Values are picked in order without trying to fill a response optimally.
pub struct FindValueRequestHandler {
    context: Arc<Context>,
    lookup: Arc<dyn NodeLookupResponder>,
}

impl FindValueRequestHandler {
    pub fn new(context: Arc<Context>, lookup: Arc<dyn NodeLookupResponder>) -> Self {
        FindValueRequestHandler { context, lookup }
    }
}

impl RequestHandler for FindValueRequestHandler {
    type Arguments = FindValueRequestArguments;

    fn handle_request(
        &self,
        requester: &Contact,
        arguments: FindValueRequestArguments,
    ) -> Option<ResponseSpecific> {
        self.context.stats.increment(Counter::FindValueRequests);

        let FindValueRequestArguments {
            target,
            value_type,
            secondary_keys,
        } = arguments;

        let bag = self.context.database.get_with_load(&target, true);

        let (values, keys) = bag
            .as_ref()
            .map(|bag| select(bag, value_type, &secondary_keys))
            .unwrap_or_default();

        if values.is_empty() && keys.is_empty() {
            debug!(
                ?target,
                %value_type,
                requester = ?requester.key,
                request_type = "find_value",
                "No values, answering with contacts"
            );
            self.context.stats.increment(Counter::FindValueMisses);

            return Some(ResponseSpecific::FindNode(
                self.lookup.find_node(requester, &target),
            ));
        }

        Some(ResponseSpecific::FindValue(FindValueResponseArguments {
            request_load: bag.map_or(0.0, |bag| bag.request_load),
            values,
            keys,
        }))
    }
}

/// Values to return in full, and secondary keys to advertise.
fn select(
    bag: &ValueBag,
    value_type: ValueType,
    secondary_keys: &[Key],
) -> (Vec<Value>, Vec<Key>) {
    if secondary_keys.is_empty() {
        let matching: Vec<&Value> = bag
            .values
            .values()
            .filter(|value| value_type.matches(&value.value_type))
            .collect();

        return match matching.as_slice() {
            [value] => (vec![(*value).clone()], vec![]),
            _ => (vec![], matching.iter().map(|v| v.secondary_key()).collect()),
        };
    }

    let mut values: Vec<Value> = Vec::with_capacity(secondary_keys.len());

    for key in secondary_keys {
        if values.iter().any(|value| value.secondary_key() == *key) {
            continue;
        }

        if let Some(value) = bag.get(key) {
            if value_type.matches(&value.value_type) {
                values.push(value.clone());
            }
        }
    }

    (values, vec![])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::server::testing::{node, requester, Node};
    use crate::server::FindNodeRequestHandler;

    fn handler(node: &Node) -> FindValueRequestHandler {
        FindValueRequestHandler::new(
            node.context.clone(),
            Arc::new(FindNodeRequestHandler::new(node.context.clone())),
        )
    }

    fn request(target: Key, value_type: ValueType, keys: Vec<Key>) -> FindValueRequestArguments {
        FindValueRequestArguments {
            target,
            value_type,
            secondary_keys: keys,
        }
    }

    fn find_value(response: Option<ResponseSpecific>) -> FindValueResponseArguments {
        match response {
            Some(ResponseSpecific::FindValue(arguments)) => arguments,
            other => panic!("expected a find_value response, got {other:?}"),
        }
    }

    fn store(node: &Node, primary_key: Key, value_type: ValueType) -> Value {
        let creator = Contact::new(Key::random(), "10.0.2.1:3000".parse().unwrap());
        let value = Value::new(primary_key, creator, value_type, 0, "payload");

        assert!(node.context.database.store(value.clone()));

        value
    }

    #[test]
    fn single_value_in_full() {
        let node = node(Config::default());
        let target = Key::random();
        let value = store(&node, target, ValueType::TEXT);

        let response = find_value(
            handler(&node).handle_request(&requester(), request(target, ValueType::ANY, vec![])),
        );

        assert_eq!(response.values, vec![value]);
        assert!(response.keys.is_empty());
    }

    #[test]
    fn many_values_as_keys() {
        let node = node(Config::default());
        let target = Key::random();
        let first = store(&node, target, ValueType::TEXT);
        let second = store(&node, target, ValueType::TEXT);

        let response = find_value(
            handler(&node).handle_request(&requester(), request(target, ValueType::TEXT, vec![])),
        );

        let mut keys = response.keys.clone();
        keys.sort();
        let mut expected = vec![first.secondary_key(), second.secondary_key()];
        expected.sort();

        assert!(response.values.is_empty());
        assert_eq!(keys, expected);
    }

    #[test]
    fn requested_values() {
        let node = node(Config::default());
        let target = Key::random();
        let first = store(&node, target, ValueType::TEXT);
        let _second = store(&node, target, ValueType::TEXT);

        let response = find_value(handler(&node).handle_request(
            &requester(),
            request(
                target,
                ValueType::ANY,
                vec![first.secondary_key(), Key::random(), first.secondary_key()],
            ),
        ));

        assert_eq!(response.values, vec![first]);
        assert!(response.keys.is_empty());
    }

    #[test]
    fn type_filter() {
        let node = node(Config::default());
        let target = Key::random();
        let text = store(&node, target, ValueType::TEXT);
        let _binary = store(&node, target, ValueType::BINARY);

        let response = find_value(
            handler(&node).handle_request(&requester(), request(target, ValueType::TEXT, vec![])),
        );
        assert_eq!(response.values, vec![text]);

        // Nothing of that type, fall back to contacts.
        let response =
            handler(&node).handle_request(&requester(), request(target, ValueType::LIME, vec![]));
        assert!(matches!(response, Some(ResponseSpecific::FindNode(_))));
    }

    #[test]
    fn miss_falls_back_to_contacts() {
        let node = node(Config::default());
        let requester = requester();

        let response = handler(&node).handle_request(
            &requester,
            request(Key::random(), ValueType::ANY, vec![]),
        );

        match response {
            Some(ResponseSpecific::FindNode(arguments)) => {
                assert!(node
                    .context
                    .tokens
                    .validate(&requester, Some(arguments.token.as_slice()))
                    .is_ok());
            }
            other => panic!("expected a find_node response, got {other:?}"),
        }

        assert_eq!(node.stats.get(Counter::FindValueMisses), 1);
    }

    #[test]
    fn lookups_raise_request_load() {
        let node = node(Config::default());
        let target = Key::random();
        store(&node, target, ValueType::TEXT);
        let handler = handler(&node);

        let first = find_value(
            handler.handle_request(&requester(), request(target, ValueType::ANY, vec![])),
        );
        assert_eq!(first.request_load, 0.0);

        std::thread::sleep(std::time::Duration::from_millis(20));

        let second = find_value(
            handler.handle_request(&requester(), request(target, ValueType::ANY, vec![])),
        );
        assert!(second.request_load > 0.0);
        assert_eq!(
            node.context.database.request_load(&target, false),
            second.request_load
        );
    }
}
