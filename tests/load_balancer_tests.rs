// tests/load_balancer_tests.rs
use proptest::prelude::*;
use rr_load_balancer::proxy::{Backend, BackendPool};
use std::sync::Arc;
use url::Url;

fn pool_of(n: usize) -> BackendPool {
    let mut pool = BackendPool::new();
    for i in 0..n {
        let url = Url::parse(&format!("http://127.0.0.1:{}", 8081 + i)).unwrap();
        pool.add_server(Backend::new(url));
    }
    pool
}

fn index_of(pool: &BackendPool, backend: &Arc<Backend>) -> usize {
    pool.all_backends()
        .iter()
        .position(|b| Arc::ptr_eq(b, backend))
        .unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn rotation_is_fair_and_in_registration_order(
        alive in prop::collection::vec(any::<bool>(), 1..8),
        calls in 0usize..64,
    ) {
        let picks = runtime().block_on(async {
            let pool = pool_of(alive.len());
            for (backend, up) in pool.all_backends().iter().zip(&alive) {
                backend.set_alive(*up).await;
            }

            let mut picks = Vec::new();
            for _ in 0..calls {
                match pool.get_next_peer().await {
                    Some(b) => picks.push(Some(index_of(&pool, &b))),
                    None => picks.push(None),
                }
            }
            picks
        });

        let live: Vec<usize> = (0..alive.len()).filter(|i| alive[*i]).collect();

        if live.is_empty() {
            prop_assert!(picks.iter().all(Option::is_none));
            return Ok(());
        }

        let picks: Vec<usize> = picks.into_iter().map(|p| p.unwrap()).collect();

        for pick in &picks {
            prop_assert!(alive[*pick], "dead backend {} was selected", pick);
        }

        // Each pick is the next live slot after the previous one.
        for pair in picks.windows(2) {
            let expected = (1..=alive.len())
                .map(|step| (pair[0] + step) % alive.len())
                .find(|i| alive[*i])
                .unwrap();
            prop_assert_eq!(pair[1], expected);
        }

        let floor = calls / live.len();
        let ceil = calls.div_ceil(live.len());
        for i in &live {
            let count = picks.iter().filter(|p| *p == i).count();
            prop_assert!(count == floor || count == ceil, "backend {} picked {} times", i, count);
        }
    }
}

#[tokio::test]
async fn dead_backend_is_skipped_until_revived() {
    let pool = pool_of(3);
    let dead = pool.all_backends()[1].clone();
    dead.set_alive(false).await;

    for _ in 0..9 {
        let peer = pool.get_next_peer().await.unwrap();
        assert!(!Arc::ptr_eq(&peer, &dead));
    }

    dead.set_alive(true).await;
    let mut seen = false;
    for _ in 0..3 {
        let peer = pool.get_next_peer().await.unwrap();
        seen |= Arc::ptr_eq(&peer, &dead);
    }
    assert!(seen);
}

#[tokio::test]
async fn all_dead_never_errors() {
    let pool = pool_of(3);
    for backend in pool.all_backends() {
        backend.set_alive(false).await;
    }

    for _ in 0..10 {
        assert!(pool.get_next_peer().await.is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_selection_matches_a_serial_rotation() {
    const CALLS: usize = 302;
    let pool = Arc::new(pool_of(4));

    let tasks: Vec<_> = (0..CALLS)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_next_peer().await })
        })
        .collect();

    let mut counts = [0usize; 4];
    for result in futures::future::join_all(tasks).await {
        let peer = result.unwrap().unwrap();
        counts[index_of(&pool, &peer)] += 1;
    }

    // Serial rotation from a fresh cursor starts at index 1: 1, 2, 3, 0, 1, ...
    assert_eq!(counts.iter().sum::<usize>(), CALLS);
    assert_eq!(counts, [75, 76, 76, 75]);
}
