//! Simulate a small network in process: publish values on the closest
//! nodes to their keys, then look them up from another client.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Instant};

use clap::Parser;
use flume::Receiver;
use mojito_dht::{
    transport::Outbound, ChannelTransport, Config, Contact, Context, Counter,
    FindNodeRequestArguments, FindValueRequestArguments, Key, Message, MessageDispatcher,
    MessageType, NetworkStats, RequestSpecific, ResponseSpecific, RoutingTable,
    StoreRequestArguments, StoreStatusCode, Value, ValueType,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes in the network
    #[arg(long, default_value_t = 16)]
    nodes: u8,
    /// Number of values to publish
    #[arg(long, default_value_t = 32)]
    values: usize,
    /// Replication factor
    #[arg(short, default_value_t = 4)]
    k: usize,
    /// Log at debug level
    #[arg(long)]
    verbose: bool,
}

struct Node {
    dispatcher: MessageDispatcher,
    outbound: Receiver<Outbound>,
    stats: Arc<NetworkStats>,
}

struct Network {
    contacts: Vec<Contact>,
    nodes: HashMap<SocketAddr, Node>,
}

impl Network {
    fn new(size: u8, k: usize) -> Network {
        let contacts: Vec<Contact> = (1..=size)
            .map(|i| Contact::new(Key::random(), SocketAddr::from(([10, 0, 0, i], 4000))))
            .collect();

        let nodes = contacts
            .iter()
            .map(|contact| {
                let routing = Arc::new(RoutingTable::new(contact.clone()));
                for other in &contacts {
                    routing.add(other.clone());
                }

                let stats = Arc::new(NetworkStats::new());
                let config = Config {
                    k,
                    ..Default::default()
                };
                let context = Context::new(config, routing).with_stats(stats.clone());

                let (transport, outbound) = ChannelTransport::new();
                let dispatcher = MessageDispatcher::new(Arc::new(context), Arc::new(transport));

                (
                    contact.contact_address,
                    Node {
                        dispatcher,
                        outbound,
                        stats,
                    },
                )
            })
            .collect();

        Network { contacts, nodes }
    }

    fn call(
        &self,
        from: &Contact,
        to: &Contact,
        request: RequestSpecific,
    ) -> Option<ResponseSpecific> {
        let node = self.nodes.get(&to.contact_address)?;

        let bytes = Message {
            transaction_id: 0,
            sender: from.clone(),
            message_type: MessageType::Request(request),
        }
        .to_bytes()
        .ok()?;

        node.dispatcher.handle_bytes(&bytes, from.contact_address);

        match node.outbound.try_recv().ok()?.message.message_type {
            MessageType::Response(response) => Some(response),
            MessageType::Request(_) => None,
        }
    }

    fn closest(&self, target: &Key, k: usize) -> Vec<Contact> {
        let mut contacts = self.contacts.clone();
        contacts.sort_by_key(|contact| contact.key.xor(target));
        contacts.truncate(k);
        contacts
    }

    fn publish(&self, client: &Contact, value: &Value, k: usize) -> usize {
        let mut stored = 0;

        for replica in self.closest(&value.primary_key, k) {
            let token = match self.call(
                client,
                &replica,
                RequestSpecific::FindNode(FindNodeRequestArguments {
                    target: value.primary_key,
                }),
            ) {
                Some(ResponseSpecific::FindNode(arguments)) => arguments.token,
                _ => continue,
            };

            if let Some(ResponseSpecific::Store(arguments)) = self.call(
                client,
                &replica,
                RequestSpecific::Store(StoreRequestArguments {
                    token: Some(token),
                    values: vec![value.clone()],
                }),
            ) {
                stored += arguments
                    .statuses
                    .iter()
                    .filter(|status| status.code == StoreStatusCode::Succeeded)
                    .count();
            }
        }

        stored
    }

    fn retrieve(&self, client: &Contact, primary_key: &Key, k: usize) -> Option<Value> {
        self.closest(primary_key, k).iter().find_map(|replica| {
            match self.call(
                client,
                replica,
                RequestSpecific::FindValue(FindValueRequestArguments {
                    target: *primary_key,
                    value_type: ValueType::ANY,
                    secondary_keys: vec![],
                }),
            )? {
                ResponseSpecific::FindValue(mut arguments) => arguments.values.pop(),
                _ => None,
            }
        })
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let network = Network::new(cli.nodes.max(1), cli.k);
    info!(nodes = network.contacts.len(), k = cli.k, "Network ready");

    let reader = Contact::new(Key::random(), "192.168.0.1:3000".parse().unwrap());

    let start = Instant::now();
    let mut replicas = 0;

    for i in 0..cli.values {
        // One publisher per value, hosts are limited in how much they store.
        let host = i % 250 + 1;
        let publisher = Contact::new(
            Key::random(),
            SocketAddr::from(([172, 16, (i / 250) as u8, host as u8], 3000)),
        );
        let primary_key = Key::from_sha1(format!("value {i}").as_bytes());
        let value = Value::new(
            primary_key,
            publisher.clone(),
            ValueType::TEXT,
            0,
            format!("payload {i}"),
        );

        replicas += network.publish(&publisher, &value, cli.k);
    }

    info!(
        values = cli.values,
        replicas,
        elapsed = ?start.elapsed(),
        "Published"
    );

    let start = Instant::now();
    let found = (0..cli.values)
        .filter(|i| {
            let primary_key = Key::from_sha1(format!("value {i}").as_bytes());
            network.retrieve(&reader, &primary_key, cli.k).is_some()
        })
        .count();

    info!(
        found,
        of = cli.values,
        elapsed = ?start.elapsed(),
        "Retrieved"
    );

    for (address, node) in &network.nodes {
        info!(
            ?address,
            stored = node.stats.get(Counter::StoredValues),
            rejected = node.stats.get(Counter::RejectedValues),
            lookups = node.stats.get(Counter::FindValueRequests),
            misses = node.stats.get(Counter::FindValueMisses),
            "Node stats"
        );
    }
}
