use std::time::Duration;

use prefix_dht::rpc::{Config, Query, Transport};
use prefix_dht::{Dht, Id, Testnet};

fn id(bytes: &[u8]) -> Id {
    Id::from_bytes(bytes).unwrap()
}

#[test]
fn closer_node_ranks_first() {
    let testnet = Testnet::default();

    let own = Dht::new(id(&[1, 10, 15]), Config::default());
    own.bootstrap(&[id(&[128, 111, 222]), id(&[64, 111, 222])]);
    testnet.insert(own.clone());

    let seeker = own.seek(id(&[192, 111, 222]), None).unwrap();

    assert_eq!(seeker.closest().get(0), Some(&id(&[128, 111, 222])));
    assert_eq!(seeker.closest().get(1), Some(&id(&[64, 111, 222])));
}

#[test]
fn search_is_done_on_first_response_with_target() {
    let testnet = Testnet::default();

    let own = Dht::new(id(&[1, 10, 15]), Config::default());
    let hop = Dht::new(id(&[64, 111, 222]), Config::default());
    let target = Dht::new(id(&[128, 111, 222]), Config::default());

    own.bootstrap(&[hop.id().clone()]);
    hop.bootstrap(&[target.id().clone()]);

    for dht in [&own, &hop, &target] {
        testnet.insert(dht.clone());
    }

    let seeker = own.search(target.id(), &testnet).unwrap();

    assert!(seeker.is_done());
    // The local seed, then the hop who knows the target.
    assert_eq!(seeker.successes(), 2);
    assert_eq!(seeker.pending(), 0);

    // The target itself was never asked.
    assert!(!target.routing_table().contains(own.id()));
    assert!(hop.routing_table().contains(own.id()));
    assert!(own.routing_table().contains(hop.id()));
}

#[test]
fn search_for_an_unknown_node() {
    let testnet = Testnet::new(10, 4, Config::default());
    let node = testnet.get(&testnet.ids()[0]).unwrap();

    let seeker = node.search(&Id::random(4), &testnet).unwrap();

    assert!(!seeker.is_done());
    assert_eq!(seeker.pending(), 0);
    assert_eq!(seeker.responses(), seeker.successes());
}

#[test]
fn every_node_is_found_through_the_seed() {
    let testnet = Testnet::new(10, 8, Config::default());
    let nodes: Vec<Dht> = testnet.ids().iter().filter_map(|id| testnet.get(id)).collect();

    let seed = nodes
        .iter()
        .find(|dht| dht.routing_table().is_empty())
        .unwrap()
        .clone();

    // Introduce everybody to the seed with a single request.
    for node in nodes.iter().filter(|dht| dht.id() != seed.id()) {
        let mut seeker = node.seek(Id::random(8), None).unwrap();

        let (to, request) = seeker.next().unwrap();
        assert_eq!(&to, seed.id());

        let response = testnet.send(&to, &request, Duration::from_secs(1)).unwrap();
        assert!(seeker.handle(response));
    }

    assert_eq!(seed.routing_table().known_count(), nodes.len() - 1);

    let client = Dht::new(Id::random(8), Config::default());
    client.bootstrap(&[seed.id().clone()]);

    for node in nodes.iter().filter(|dht| dht.id() != seed.id()) {
        let seeker = client.search(node.id(), &testnet).unwrap();

        assert!(seeker.is_done(), "Failed to find {}", node.id());
        assert_eq!(seeker.successes(), 2);
    }

    // Only the seed ever responded.
    assert_eq!(client.routing_table().ids(), vec![seed.id().clone()]);
}

#[test]
fn unresponsive_nodes_are_abandoned() {
    let testnet = Testnet::new(3, 4, Config::default());
    let ids = testnet.ids();

    for id in &ids {
        testnet.set_offline(id, true);
    }

    let client = Dht::new(Id::random(4), Config::default());
    client.bootstrap(&ids);

    let seeker = client.search(&ids[0], &testnet).unwrap();

    // Found in the local seed already.
    assert!(seeker.is_done());

    let seeker = client.search(&Id::random(4), &testnet).unwrap();

    assert!(!seeker.is_done());
    assert_eq!(seeker.successes(), 1);
    assert_eq!(seeker.responses(), 4);
    // Lookups never blacklist.
    assert_eq!(client.routing_table().known_count(), 3);
}
