//! Composition of operation middlewares.
use std::sync::Arc;

/// Wraps an operation implementation of shape `F` with extra behavior.
///
/// `F` is one of the shared operation function types, e.g.
/// [`PingFn`](crate::ping::PingFn). A middleware receives the next
/// implementation in the chain and returns a new one.
pub(crate) type Middleware<F> = Arc<dyn Fn(F) -> F + Send + Sync>;

/// Builds a single operation from `middlewares` and a `terminal`
/// implementation.
///
/// The first middleware is the outermost: it runs first and decides whether
/// and when the rest of the chain runs. The terminal runs last. An empty list
/// returns `terminal` unchanged.
pub(crate) fn chain<F>(middlewares: &[Middleware<F>], terminal: F) -> F {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware(next))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type TraceFn = Arc<dyn Fn(&Mutex<Vec<String>>) + Send + Sync>;

    fn named(name: &'static str) -> Middleware<TraceFn> {
        Arc::new(move |next: TraceFn| -> TraceFn {
            Arc::new(move |log: &Mutex<Vec<String>>| {
                log.lock().unwrap().push(format!("{name} before"));
                next(log);
                log.lock().unwrap().push(format!("{name} after"));
            })
        })
    }

    fn terminal() -> TraceFn {
        Arc::new(|log: &Mutex<Vec<String>>| log.lock().unwrap().push("terminal".to_string()))
    }

    #[test]
    fn empty_chain_is_terminal() {
        let terminal = terminal();
        let chained = chain(&[], terminal.clone());

        assert!(Arc::ptr_eq(&chained, &terminal));
    }

    #[test]
    fn first_middleware_is_outermost() {
        let log = Mutex::new(Vec::new());

        chain(&[named("m1"), named("m2")], terminal())(&log);

        assert_eq!(
            log.into_inner().unwrap(),
            vec!["m1 before", "m2 before", "terminal", "m2 after", "m1 after"]
        );
    }

    #[test]
    fn middleware_can_short_circuit() {
        let stop: Middleware<TraceFn> = Arc::new(|_next: TraceFn| -> TraceFn {
            Arc::new(|log: &Mutex<Vec<String>>| log.lock().unwrap().push("stop".to_string()))
        });
        let log = Mutex::new(Vec::new());

        chain(&[named("m1"), stop, named("m2")], terminal())(&log);

        assert_eq!(
            log.into_inner().unwrap(),
            vec!["m1 before", "stop", "m1 after"]
        );
    }
}
