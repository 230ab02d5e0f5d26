//! # Scenario Tests (S1-S6)
//!
//! End-to-end checks across store, graph, broker and ingestion.
//!
//! ## Tiers
//! - S1: Basic add/query
//! - S2: Link round-trip
//! - S3: Sub-graph depth
//! - S4: Broker pub/sub
//! - S5: Broker backpressure
//! - S6: Ingestion with placeholder
//! - Link-before-entities upgrade

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;
use toposcrape_core::primitives::PARTIAL_TYPE;
use toposcrape_core::{
    AddOptions, Broker, BrokerConfig, Entity, GraphKind, LinkOptions, Message, MessageType,
    Origin, Plan, PubOptions, Query, RecvOptions, Resource, Store, TopoError, Uid,
};
use tokio_util::sync::CancellationToken;

fn store(kind: GraphKind) -> Store {
    let plan = Plan::new(Origin::parse("memory://scenarios").unwrap());
    Store::new(kind, plan)
}

fn entity(uid: &str, name: &str, ns: &str, kind: &str) -> Entity {
    let resource = Resource::new(Uid::new(format!("r-{}", kind)), kind, "core", "v1", kind, true);
    Entity::new(Uid::new(uid), name, ns, resource)
}

fn hit_uids(hits: &[toposcrape_core::Hit]) -> Vec<String> {
    hits.iter().map(|h| h.uid().to_string()).collect()
}

// =============================================================================
// S1: BASIC ADD/QUERY
// =============================================================================

mod s1_add_query {
    use super::*;

    #[test]
    fn namespace_query_finds_entity() {
        let ctx = CancellationToken::new();
        let store = store(GraphKind::Undirected);
        let e1 = entity("u1", "n1", "ns", "k");
        store.add(&ctx, e1.clone(), AddOptions::default()).unwrap();

        let hits = store.query(&ctx, &Query::build().namespace("ns")).unwrap();
        assert_eq!(hit_uids(&hits), vec!["u1"]);
        assert_eq!(hits[0].as_node().unwrap().entity(), &e1);

        let none = store.query(&ctx, &Query::build().namespace("other")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn get_returns_what_was_added() {
        let ctx = CancellationToken::new();
        let store = store(GraphKind::Directed);
        let e1 = entity("u1", "n1", "ns", "k");
        store.add(&ctx, e1.clone(), AddOptions::default()).unwrap();
        store.add(&ctx, e1.clone(), AddOptions::default()).unwrap();

        assert_eq!(store.get(&ctx, &Uid::new("u1")).unwrap(), e1);
        assert_eq!(store.len(), 1);
    }
}

// =============================================================================
// S2: LINK ROUND-TRIP
// =============================================================================

mod s2_link_round_trip {
    use super::*;

    #[test]
    fn weight_survives_and_unlink_removes() {
        let ctx = CancellationToken::new();
        let store = store(GraphKind::Undirected);
        store.add(&ctx, entity("u1", "n1", "ns", "k"), AddOptions::default()).unwrap();
        store.add(&ctx, entity("u2", "n2", "ns", "k"), AddOptions::default()).unwrap();
        let (u1, u2) = (Uid::new("u1"), Uid::new("u2"));

        store
            .link(&ctx, &u1, &u2, LinkOptions::new().with_weight(2.5))
            .unwrap();
        assert_eq!(store.graph().edge(&u1, &u2).unwrap().weight(), 2.5);

        store.unlink(&ctx, &u1, &u2).unwrap();
        assert_eq!(
            store.graph().edge(&u1, &u2),
            Err(TopoError::EdgeNotExist(u1.clone(), u2.clone()))
        );
    }
}

// =============================================================================
// S3: SUB-GRAPH DEPTH
// =============================================================================

mod s3_sub_graph_depth {
    use super::*;

    fn chain() -> Store {
        let ctx = CancellationToken::new();
        let store = store(GraphKind::Directed);
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            store.add(&ctx, entity(name, name, "ns", "k"), AddOptions::default()).unwrap();
        }
        for pair in names.windows(2) {
            store
                .link(&ctx, &Uid::new(pair[0]), &Uid::new(pair[1]), LinkOptions::new())
                .unwrap();
        }
        store
    }

    fn nodes_at(store: &Store, depth: usize) -> Vec<String> {
        let ctx = CancellationToken::new();
        let sub = store.sub_graph(&ctx, &Uid::new("a"), depth).unwrap();
        sub.nodes().iter().map(|n| n.uid().to_string()).collect()
    }

    #[test]
    fn depth_bounds_reach() {
        let store = chain();
        assert_eq!(nodes_at(&store, 0), vec!["a"]);
        assert_eq!(nodes_at(&store, 1), vec!["a", "b"]);
        assert_eq!(nodes_at(&store, 10), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn missing_seed() {
        let ctx = CancellationToken::new();
        assert_eq!(
            chain().sub_graph(&ctx, &Uid::new("z"), 1).map(|g| g.node_count()),
            Err(TopoError::NodeNotFound(Uid::new("z")))
        );
    }
}

// =============================================================================
// S4: BROKER PUB/SUB
// =============================================================================

mod s4_broker_pub_sub {
    use super::*;

    #[tokio::test]
    async fn delivers_exactly_once() {
        let ctx = CancellationToken::new();
        let broker = Broker::new(BrokerConfig {
            capacity: 1,
            recv_timeout: Duration::from_millis(50),
            ..BrokerConfig::default()
        });
        broker.open(&ctx).unwrap();
        let sub = broker.subscribe("t").unwrap();

        let m1 = Message::with_uid(Uid::new("m1"), MessageType::Unknown, b"x".to_vec());
        broker.publish(&ctx, "t", m1, PubOptions::default()).await.unwrap();

        let mut seen: Vec<Uid> = Vec::new();
        let mut handler = |_: &CancellationToken, msg: Message| -> Result<(), TopoError> {
            seen.push(msg.uid);
            Ok(())
        };
        sub.receive(&ctx, &mut handler, RecvOptions::default()).await.unwrap();
        assert_eq!(
            sub.receive(&ctx, &mut handler, RecvOptions::default()).await,
            Err(TopoError::Timeout)
        );
        assert_eq!(seen, vec![Uid::new("m1")]);

        broker.close().await;
    }

    #[tokio::test]
    async fn fifo_within_a_topic() {
        let ctx = CancellationToken::new();
        let broker = Broker::default();
        broker.open(&ctx).unwrap();
        let sub = broker.subscribe("t").unwrap();

        for i in 0u8..10 {
            let msg = Message::with_uid(Uid::new(format!("m{}", i)), MessageType::Unknown, vec![i]);
            broker.publish(&ctx, "t", msg, PubOptions::default()).await.unwrap();
        }

        let mut order = Vec::new();
        let mut handler = |_: &CancellationToken, msg: Message| -> Result<(), TopoError> {
            order.extend(msg.data);
            Ok(())
        };
        for _ in 0..10 {
            sub.receive(&ctx, &mut handler, RecvOptions::default()).await.unwrap();
        }
        assert_eq!(order, (0u8..10).collect::<Vec<u8>>());

        broker.close().await;
    }
}

// =============================================================================
// S5: BROKER BACKPRESSURE
// =============================================================================

mod s5_backpressure {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unbuffered_publish_times_out() {
        let ctx = CancellationToken::new();
        let broker = Broker::new(BrokerConfig {
            capacity: 0,
            ..BrokerConfig::default()
        });
        broker.open(&ctx).unwrap();
        let _sub = broker.subscribe("t").unwrap();

        let opts = PubOptions {
            timeout: Some(Duration::from_millis(100)),
        };
        let started = tokio::time::Instant::now();
        let msg = Message::new(MessageType::Unknown, b"m".to_vec());
        assert_eq!(broker.publish(&ctx, "t", msg, opts).await, Err(TopoError::Timeout));

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150));

        broker.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_times_out_after_pub_timeout() {
        let ctx = CancellationToken::new();
        let broker = Broker::new(BrokerConfig {
            capacity: 1,
            pub_timeout: Duration::from_millis(200),
            ..BrokerConfig::default()
        });
        broker.open(&ctx).unwrap();
        let _sub = broker.subscribe("t").unwrap();

        let first = Message::new(MessageType::Unknown, b"1".to_vec());
        broker.publish(&ctx, "t", first, PubOptions::default()).await.unwrap();

        let started = tokio::time::Instant::now();
        let second = Message::new(MessageType::Unknown, b"2".to_vec());
        assert_eq!(
            broker.publish(&ctx, "t", second, PubOptions::default()).await,
            Err(TopoError::Timeout)
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250));

        broker.close().await;
    }
}

// =============================================================================
// S6: INGESTION WITH PLACEHOLDER
// =============================================================================

mod s6_ingestion_placeholder {
    use super::*;
    use toposcrape_core::{Digester, Ingester, Link, Payload, StoreHandler};

    #[tokio::test]
    async fn link_message_creates_two_partials() {
        let ctx = CancellationToken::new();
        let broker = Broker::default();
        broker.open(&ctx).unwrap();

        let digester = Digester::new(broker.subscribe("topology").unwrap()).with_options(
            RecvOptions {
                timeout: Some(Duration::from_millis(50)),
            },
        );
        let link = Link::new(Uid::new("u1"), Uid::new("u2"));
        Ingester::new(broker.clone())
            .publish(&ctx, "topology", &Payload::Link(link))
            .await
            .unwrap();

        let store = Arc::new(store(GraphKind::Directed));
        let mut handler = StoreHandler::new(Arc::clone(&store));
        assert_eq!(digester.run(&ctx, &mut handler).await, Err(TopoError::Timeout));

        let entities = store.entities();
        assert_eq!(entities.len(), 2);
        assert!(entities.iter().all(|e| e.entity_type == PARTIAL_TYPE));
        assert_eq!(store.links().len(), 1);

        broker.close().await;
    }
}

// =============================================================================
// LINK-BEFORE-ENTITIES
// =============================================================================

mod link_before_entities {
    use super::*;

    #[test]
    fn partial_is_upgraded_in_place() {
        let ctx = CancellationToken::new();
        let store = store(GraphKind::Directed);
        let (u1, u2) = (Uid::new("u1"), Uid::new("u2"));

        store.link(&ctx, &u1, &u2, LinkOptions::new()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get(&ctx, &u1).unwrap().is_partial());
        let before = store.graph().node(&u1).unwrap().id();

        store.add(&ctx, entity("u1", "web", "prod", "Pod"), AddOptions::default()).unwrap();

        let graph = store.graph();
        let upgraded = graph.node(&u1).unwrap();
        assert_eq!(upgraded.id(), before);
        assert_eq!(upgraded.entity().name, "web");
        assert_eq!(upgraded.dot_id(), "core/v1/Pod/prod/web");
        assert!(!upgraded.entity().is_partial());
        assert!(graph.has_edge(&u1, &u2));
        assert!(store.get(&ctx, &u2).unwrap().is_partial());
        assert_eq!(store.len(), 2);
    }
}
