use crate::{
    CausalTrace, ContextProvider, Error, IdentifierRequest, Locale, PoolTask, Principal,
    QueuePolicy, ScatterGatherInvoker, SplitPolicy, ThreadLocalContext, TypedResponse, WorkerPool,
};
use rand::Rng;
use std::cell::Cell;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, PartialEq, thiserror::Error)]
enum LookupError {
    #[error("resource {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Pool(#[from] Error),
}

fn uuid_like(rng: &mut impl Rng) -> String {
    let hex = format!("{:032x}", rng.random::<u128>());
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn uuid_request(amount: usize) -> IdentifierRequest<String> {
    let mut rng = rand::rng();
    let mut ids = HashSet::with_capacity(amount);
    while ids.len() < amount {
        ids.insert(uuid_like(&mut rng));
    }
    ids.into_iter().collect()
}

fn echo(chunk: IdentifierRequest<String>) -> Result<TypedResponse<String>, Error> {
    Ok(chunk.into_iter().collect())
}

fn invoker(workers: usize) -> ScatterGatherInvoker {
    ScatterGatherInvoker::new(Arc::new(WorkerPool::new(workers).unwrap()))
}

/// Reports the ambient context a worker thread carries between tasks.
struct Probe;

impl PoolTask for Probe {
    type Output = (Locale, Option<Principal>, bool);

    fn run(&mut self) -> Self::Output {
        let ctx = ThreadLocalContext;
        (
            ctx.current_locale(),
            ctx.current_principal(),
            CausalTrace::current().is_some(),
        )
    }
}

fn assert_workers_are_clean(pool: &WorkerPool) {
    let outcomes = pool
        .invoke_all((0..pool.workers() * 4).map(|_| Probe))
        .unwrap();
    for outcome in outcomes {
        assert_eq!(outcome.unwrap(), (Locale::default(), None, false));
    }
}

#[test]
fn echoes_250_identifiers_over_3_workers() {
    let invoker = invoker(3);
    let request = uuid_request(250);
    let expected = request.ids().clone();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let response = invoker
        .invoke(
            move |chunk: IdentifierRequest<String>| {
                counted.fetch_add(1, Ordering::Relaxed);
                echo(chunk)
            },
            request,
        )
        .unwrap();

    assert_eq!(response.len(), 250);
    assert_eq!(
        response.into_elements(),
        expected.into_iter().collect::<HashSet<_>>()
    );
    assert_eq!(calls.load(Ordering::Relaxed), 10);
}

#[test]
fn small_request_is_a_single_chunk_call() {
    let invoker = invoker(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let response = invoker
        .invoke(
            move |chunk: IdentifierRequest<String>| {
                counted.fetch_add(1, Ordering::Relaxed);
                echo(chunk)
            },
            uuid_request(5),
        )
        .unwrap();
    assert_eq!(response.len(), 5);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn empty_request_is_sent_as_one_empty_chunk() {
    let invoker = invoker(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let response = invoker
        .invoke(
            move |chunk: IdentifierRequest<String>| {
                assert!(chunk.is_empty());
                counted.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Error>(TypedResponse::from_iter([42u32]))
            },
            IdentifierRequest::new(),
        )
        .unwrap();

    assert_eq!(response.into_single_result().unwrap(), 42);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn empty_request_surfaces_the_chunk_call_error() {
    let err = invoker(1)
        .invoke(
            |_: IdentifierRequest<u64>| {
                Err::<TypedResponse<u64>, _>(LookupError::NotFound("empty".to_string()))
            },
            IdentifierRequest::new(),
        )
        .unwrap_err();
    assert!(matches!(err, LookupError::NotFound(reason) if reason == "empty"));
}

#[test]
fn concurrent_invocations_keep_their_own_context() {
    // Two workers serve two callers, so every worker alternates between them.
    let invoker = invoker(2);

    std::thread::scope(|s| {
        for (locale, user) in [("de-AT", "alice"), ("pt-BR", "bob")] {
            let invoker = invoker.clone();
            s.spawn(move || {
                let ctx = ThreadLocalContext;
                ctx.set_locale(Locale::new(locale));
                ctx.set_principal(Principal::new(user).with_role("reader"));

                let seen = invoker
                    .invoke(
                        |chunk: IdentifierRequest<String>| {
                            std::thread::sleep(Duration::from_millis(1));
                            let ctx = ThreadLocalContext;
                            let locale = ctx.current_locale().as_str().to_string();
                            let user = ctx.current_principal().map(|p| p.name().to_string());
                            Ok::<_, Error>(
                                chunk
                                    .into_iter()
                                    .map(|id| (id, locale.clone(), user.clone()))
                                    .collect(),
                            )
                        },
                        uuid_request(500),
                    )
                    .unwrap();

                assert_eq!(seen.len(), 500);
                for (_, seen_locale, seen_user) in &seen {
                    assert_eq!(seen_locale, locale);
                    assert_eq!(seen_user.as_deref(), Some(user));
                }
            });
        }
    });

    assert_workers_are_clean(invoker.pool());
}

#[test]
fn context_does_not_leak_into_a_later_anonymous_invocation() {
    let invoker = invoker(2);
    let ctx = ThreadLocalContext;
    let observe = |_: IdentifierRequest<u32>| {
        let ctx = ThreadLocalContext;
        Ok::<_, Error>(TypedResponse::from_iter([(
            ctx.current_locale(),
            ctx.current_principal(),
        )]))
    };

    ctx.set_locale(Locale::new("fr"));
    ctx.set_principal(Principal::new("carol"));
    let first = invoker.invoke(observe, (0..2000).collect()).unwrap();
    assert_eq!(
        first.into_single_result().unwrap(),
        (Locale::new("fr"), Some(Principal::new("carol")))
    );

    ctx.reset_locale();
    ctx.clear_principal();
    let second = invoker.invoke(observe, (0..2000).collect()).unwrap();
    assert_eq!(
        second.into_single_result().unwrap(),
        (Locale::default(), None)
    );

    assert_workers_are_clean(invoker.pool());
}

#[test]
fn chunk_call_error_is_returned_unchanged() {
    let invoker = invoker(3);
    let request: IdentifierRequest<u32> = (0..1000).collect();

    let err = invoker
        .invoke(
            |chunk: IdentifierRequest<u32>| {
                if chunk.contains(&500) {
                    Err(LookupError::NotFound("500".to_string()))
                } else {
                    Ok(chunk.into_iter().collect::<TypedResponse<u32>>())
                }
            },
            request,
        )
        .unwrap_err();

    assert_eq!(err, LookupError::NotFound("500".to_string()));
    assert_workers_are_clean(invoker.pool());
}

#[test]
fn first_failing_chunk_in_submission_order_wins() {
    let invoker = invoker(4);
    let err = invoker
        .invoke(
            |chunk: IdentifierRequest<u32>| -> Result<TypedResponse<u32>, LookupError> {
                Err(LookupError::NotFound(chunk.iter().next().unwrap().to_string()))
            },
            (0..1000).collect(),
        )
        .unwrap_err();
    assert_eq!(err, LookupError::NotFound("0".to_string()));
}

#[test]
#[should_panic(expected = "boom")]
fn chunk_call_panic_is_resumed_on_the_caller() {
    let invoker = invoker(2);
    let _ = invoker.invoke(
        |_: IdentifierRequest<u32>| -> Result<TypedResponse<u32>, Error> { panic!("boom") },
        (0..10).collect(),
    );
}

#[test]
fn pool_survives_a_panicking_invocation() {
    let invoker = invoker(2);
    let panicked = std::panic::catch_unwind(AssertUnwindSafe(|| {
        invoker.invoke(
            |_: IdentifierRequest<u32>| -> Result<TypedResponse<u32>, Error> { panic!("boom") },
            (0..1000).collect(),
        )
    }));
    assert!(panicked.is_err());

    let response = invoker
        .invoke(
            |chunk: IdentifierRequest<u32>| Ok::<_, Error>(chunk.into_iter().collect()),
            (0..1000).collect(),
        )
        .unwrap();
    assert_eq!(response.len(), 1000);
    assert_workers_are_clean(invoker.pool());
}

#[test]
fn shutdown_while_waiting_interrupts_the_invocation() {
    let invoker = invoker(1);
    let (open, gate) = crossbeam_channel::unbounded::<()>();
    let (started_tx, started_rx) = crossbeam_channel::unbounded();

    std::thread::scope(|s| {
        let caller = s.spawn(|| {
            invoker.invoke(
                move |chunk: IdentifierRequest<u32>| {
                    if chunk.contains(&0) {
                        started_tx.send(()).unwrap();
                        let _ = gate.recv();
                    }
                    Ok::<_, LookupError>(chunk.into_iter().collect())
                },
                (0..1000).collect(),
            )
        });

        started_rx.recv().unwrap();
        let pool = invoker.pool();
        // 1000 small identifiers make 40 chunks; all but the first must be queued.
        while pool.stats().queued < 39 {
            std::thread::yield_now();
        }
        s.spawn(move || pool.shutdown());
        while !pool.is_shutdown() || pool.stats().queued != 0 {
            std::thread::yield_now();
        }
        drop(open);

        let err = caller.join().unwrap().unwrap_err();
        assert_eq!(err, LookupError::Pool(Error::Interrupted));
    });
}

#[test]
fn invoking_a_shut_down_pool_fails() {
    let invoker = invoker(1);
    invoker.pool().shutdown();
    let err = invoker
        .invoke(echo, uuid_request(3))
        .unwrap_err();
    assert_eq!(err, Error::PoolShutdown);
}

#[test]
fn trace_is_installed_only_while_a_chunk_runs() {
    let invoker = invoker(2);
    let installed = invoker
        .invoke(
            |_: IdentifierRequest<u32>| {
                Ok::<_, Error>(TypedResponse::from_iter([CausalTrace::current().is_some()]))
            },
            (0..1000).collect(),
        )
        .unwrap();
    assert!(installed.into_single_result().unwrap());
    assert_workers_are_clean(invoker.pool());
}

#[test]
fn disabled_trace_capture_installs_an_empty_trace() {
    let invoker = invoker(1).with_trace_capture(false);
    assert!(!invoker.captures_trace());
    let empty = invoker
        .invoke(
            |_: IdentifierRequest<u32>| {
                let trace = CausalTrace::current().unwrap();
                Ok::<_, Error>(TypedResponse::from_iter([trace.is_empty()]))
            },
            (0..10).collect(),
        )
        .unwrap();
    assert!(empty.into_single_result().unwrap());
}

#[test]
fn custom_split_policy_and_bounded_queue() {
    let pool = WorkerPool::builder(2)
        .queue_policy(QueuePolicy::Bounded(1))
        .build()
        .unwrap();
    let invoker = ScatterGatherInvoker::new(Arc::new(pool))
        .with_split_policy(SplitPolicy::new(10, 2, 1).unwrap());
    assert_eq!(invoker.split_policy().window(), 5);

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let response = invoker
        .invoke(
            move |chunk: IdentifierRequest<u32>| {
                assert!(chunk.len() <= 5);
                counted.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Error>(chunk.into_iter().collect())
            },
            (0..100).collect(),
        )
        .unwrap();

    assert_eq!(response.len(), 100);
    assert_eq!(calls.load(Ordering::Relaxed), 20);
}

thread_local! {
    static TENANT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// A provider with its own storage and its own notion of locale.
struct TenantContext;

impl ContextProvider for TenantContext {
    type Locale = &'static str;
    type Principal = u64;

    fn current_locale(&self) -> &'static str {
        "und"
    }

    fn set_locale(&self, _: &'static str) {}

    fn reset_locale(&self) {}

    fn current_principal(&self) -> Option<u64> {
        TENANT.with(Cell::get)
    }

    fn set_principal(&self, tenant: u64) {
        TENANT.with(|t| t.set(Some(tenant)));
    }

    fn clear_principal(&self) {
        TENANT.with(|t| t.set(None));
    }
}

#[test]
fn custom_provider_carries_its_own_context() {
    let pool = Arc::new(WorkerPool::new(2).unwrap());
    let invoker = ScatterGatherInvoker::with_provider(Arc::clone(&pool), TenantContext);

    invoker.provider().set_principal(7);
    let tenants = invoker
        .invoke(
            |_: IdentifierRequest<u32>| {
                Ok::<_, Error>(TypedResponse::from_iter([TenantContext.current_principal()]))
            },
            (0..1000).collect(),
        )
        .unwrap();
    invoker.provider().clear_principal();

    assert_eq!(tenants.into_single_result().unwrap(), Some(7));
}
