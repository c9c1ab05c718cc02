//! Connections to the system under test and the shared connection pool.
//!
//! The harness never speaks a wire protocol itself. It drives anything that can
//! open a session, execute a statement, and report failures as error text —
//! the two traits below are the entire contract. [`ConnectionPool`] holds a
//! fixed set of pre-opened sessions for actions that borrow rather than own
//! their connection.

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::error::Result;

/// A statement failure, carrying the target's error text.
///
/// The retry policy classifies these purely by substring match on the message,
/// so implementations should pass the target's error text through verbatim.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecuteError {
    pub message: String,
}

impl ExecuteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One open session against the system under test.
pub trait Connection: Send {
    /// Execute a single statement, returning the target's error text on failure.
    fn execute(&mut self, statement: &str) -> std::result::Result<(), ExecuteError>;

    /// Close the session. Called once, from teardown or when an owning action
    /// finishes with the connection.
    fn close(&mut self);
}

/// Opaque connection configuration (host, credentials, whatever the target
/// needs). The harness only ever asks it to open sessions.
///
/// Implementors should map their driver's open failure into
/// [`Error::Connect`](crate::Error::Connect):
///
/// ```no_run
/// use parabench::{Connection, Connector, Error, ExecuteError, Result};
///
/// struct PgSession(std::net::TcpStream);
///
/// impl Connection for PgSession {
///     fn execute(&mut self, _statement: &str) -> std::result::Result<(), ExecuteError> {
///         // Drive the wire protocol here; pass error text through verbatim.
///         Ok(())
///     }
///     fn close(&mut self) {}
/// }
///
/// struct PgConnector {
///     addr: String,
/// }
///
/// impl Connector for PgConnector {
///     fn connect(&self) -> Result<Box<dyn Connection>> {
///         let stream = std::net::TcpStream::connect(&self.addr)
///             .map_err(|err| Error::Connect(err.to_string()))?;
///         Ok(Box::new(PgSession(stream)))
///     }
/// }
/// ```
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// A fixed-size pool of pre-opened sessions.
///
/// `get` blocks indefinitely when the pool is exhausted — there is no timeout,
/// so a borrower that never returns its connection starves everyone behind it.
/// Connections travel through an unbounded channel, which gives us blocking
/// get/put semantics without a condvar of our own.
#[derive(Debug)]
pub struct ConnectionPool {
    tx: Sender<Box<dyn Connection>>,
    rx: Receiver<Box<dyn Connection>>,
    size: usize,
}

impl ConnectionPool {
    /// Open `size` connections up front. Pool size is fixed for the lifetime
    /// of the scenario that owns it.
    pub fn open(connector: &dyn Connector, size: usize) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..size {
            let conn = connector.connect()?;
            tx.send(conn).expect("pool channel closed during open");
        }
        Ok(Self { tx, rx, size })
    }

    /// Borrow a connection, blocking until one is available. The guard returns
    /// it on drop, on every exit path — including unwinds out of a failing
    /// action.
    pub fn get(&self) -> PoolGuard<'_> {
        let conn = self
            .rx
            .recv()
            .expect("pool channel closed while borrowing");
        PoolGuard {
            pool: self,
            conn: Some(conn),
        }
    }

    /// Number of connections the pool was opened with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently sitting in the pool (not borrowed).
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Drain the pool and close every connection still in it, returning how
    /// many were closed. Used by teardown.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        while let Ok(mut conn) = self.rx.try_recv() {
            conn.close();
            closed += 1;
        }
        closed
    }

    fn put(&self, conn: Box<dyn Connection>) {
        self.tx.send(conn).expect("pool channel closed on return");
    }
}

/// RAII borrow of a pooled connection.
pub struct PoolGuard<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Box<dyn Connection>>,
}

impl PoolGuard<'_> {
    pub fn conn(&mut self) -> &mut dyn Connection {
        self.conn
            .as_mut()
            .expect("connection already returned")
            .as_mut()
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared mock target used by tests across the crate.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::error::Error;

    use super::*;

    /// Install a subscriber writing to the test capture buffer, so harness
    /// logs show up under `--nocapture`. Safe to call from every test; only
    /// the first call wins.
    pub(crate) fn init_test_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    /// Connector whose connections share a scripted queue of failures and a
    /// set of counters, so tests can observe opens, closes, and attempts.
    #[derive(Clone, Default)]
    pub(crate) struct MockConnector {
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        pub executed: Arc<AtomicUsize>,
        /// Statements executed, in order, across all connections.
        pub statements: Arc<Mutex<Vec<String>>>,
        /// Errors handed out before execute starts succeeding.
        pub failures: Arc<Mutex<VecDeque<ExecuteError>>>,
        /// When set, `connect` refuses with [`Error::Connect`].
        pub refuse_connect: Arc<AtomicBool>,
        /// Artificial latency per execute call.
        pub latency: Duration,
    }

    impl MockConnector {
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        pub fn push_failure(&self, message: &str) {
            self.failures.lock().push_back(ExecuteError::new(message));
        }
    }

    impl Connector for MockConnector {
        fn connect(&self) -> Result<Box<dyn Connection>> {
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err(Error::Connect("connection refused".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockConnection {
                shared: self.clone(),
            }))
        }
    }

    pub(crate) struct MockConnection {
        shared: MockConnector,
    }

    impl Connection for MockConnection {
        fn execute(&mut self, statement: &str) -> std::result::Result<(), ExecuteError> {
            if !self.shared.latency.is_zero() {
                std::thread::sleep(self.shared.latency);
            }
            self.shared.executed.fetch_add(1, Ordering::SeqCst);
            self.shared.statements.lock().push(statement.to_string());
            match self.shared.failures.lock().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn close(&mut self) {
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockConnector;
    use super::*;

    #[test]
    fn pool_opens_fixed_number_of_connections() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::open(&connector, 4).unwrap();
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(connector.opened.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[test]
    fn guard_returns_connection_on_drop() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::open(&connector, 1).unwrap();
        {
            let _guard = pool.get();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn pool_open_propagates_connect_failures() {
        let connector = MockConnector::default();
        connector
            .refuse_connect
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let err = ConnectionPool::open(&connector, 1).unwrap_err();
        assert!(matches!(err, crate::error::Error::Connect(_)));
    }

    #[test]
    fn close_all_closes_every_pooled_connection() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::open(&connector, 3).unwrap();
        assert_eq!(pool.close_all(), 3);
        assert_eq!(connector.closed.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(pool.available(), 0);
    }
}
