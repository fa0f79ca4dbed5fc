//! Per-connection admission control in front of the driver.
//!
//! Two gates apply to every outbound driver call: a concurrency cap per
//! `connectionName` with a bounded wait queue (overflow returns `Busy`
//! immediately), and a per-connection request rate limiter checked in a
//! bounded sleep/retry loop.

use crate::constants;
use crate::errors::OrchestratorError;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Condvar, Mutex};

type ConnectionRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, NoOpMiddleware>;

#[derive(Default)]
struct GateState {
    in_flight: usize,
    waiting: usize,
}

pub struct ConnectionThrottle {
    max_in_flight: usize,
    max_waiting: usize,
    gates: Mutex<HashMap<String, GateState>>,
    slot_freed: Condvar,
    rate_limiter: ConnectionRateLimiter,
}

impl ConnectionThrottle {
    pub fn new(max_in_flight: usize, max_waiting: usize, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32)));

        ConnectionThrottle {
            max_in_flight,
            max_waiting,
            gates: Mutex::new(HashMap::new()),
            slot_freed: Condvar::new(),
            rate_limiter: RateLimiter::keyed(quota),
        }
    }

    /// Takes a driver-call slot for `connection`, waiting in the bounded
    /// queue when the cap is saturated. Returns `Busy` when the queue is
    /// full or rate admission keeps failing.
    pub fn acquire(self: &Arc<Self>, connection: &str) -> Result<ConnectionPermit, OrchestratorError> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());

        let mut admitted = false;
        {
            let gate = gates.entry(connection.to_string()).or_default();
            if gate.in_flight < self.max_in_flight {
                gate.in_flight += 1;
                admitted = true;
            } else if gate.waiting >= self.max_waiting {
                return Err(OrchestratorError::Busy {
                    id: connection.to_string(),
                    message: format!("connection queue is full ({} waiting)", gate.waiting),
                });
            } else {
                gate.waiting += 1;
            }
        }

        while !admitted {
            gates = self.slot_freed.wait(gates).unwrap_or_else(|e| e.into_inner());
            if let Some(gate) = gates.get_mut(connection) {
                if gate.in_flight < self.max_in_flight {
                    gate.waiting -= 1;
                    gate.in_flight += 1;
                    admitted = true;
                }
            }
        }
        drop(gates);

        // admission control against provider throttling
        let key = connection.to_string();
        let mut rate_admitted = false;
        for _ in 0..constants::ADMISSION_CONTROL_MAX_TRIES {
            if self.rate_limiter.check_key(&key).is_ok() {
                rate_admitted = true;
                break;
            }
            std::thread::sleep(constants::ADMISSION_CONTROL_RETRY_INTERVAL);
        }

        if !rate_admitted {
            self.release(connection);
            return Err(OrchestratorError::Busy {
                id: connection.to_string(),
                message: "admission control cannot proceed after several tries".to_string(),
            });
        }

        Ok(ConnectionPermit {
            throttle: self.clone(),
            connection: connection.to_string(),
        })
    }

    fn release(&self, connection: &str) {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        let mut drop_entry = false;
        if let Some(gate) = gates.get_mut(connection) {
            gate.in_flight = gate.in_flight.saturating_sub(1);
            drop_entry = gate.in_flight == 0 && gate.waiting == 0;
        }
        if drop_entry {
            gates.remove(connection);
        }
        drop(gates);
        self.slot_freed.notify_all();
    }
}

impl Default for ConnectionThrottle {
    fn default() -> Self {
        ConnectionThrottle::new(
            constants::MAX_IN_FLIGHT_PER_CONNECTION,
            constants::MAX_WAITING_PER_CONNECTION,
            constants::DRIVER_REQUESTS_PER_SECOND,
        )
    }
}

/// Held for the duration of one driver call; the slot frees on drop.
pub struct ConnectionPermit {
    throttle: Arc<ConnectionThrottle>,
    connection: String,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.throttle.release(&self.connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_full_queue_returns_busy_immediately() {
        // setup:
        let throttle = Arc::new(ConnectionThrottle::new(1, 0, 1000));
        let permit = throttle.acquire("aws-conn").unwrap();

        // execute:
        let second = throttle.acquire("aws-conn");

        // verify:
        assert!(matches!(second, Err(OrchestratorError::Busy { .. })));
        drop(permit);
        assert!(throttle.acquire("aws-conn").is_ok());
    }

    #[test]
    fn test_connections_are_throttled_independently() {
        // setup:
        let throttle = Arc::new(ConnectionThrottle::new(1, 0, 1000));
        let _permit = throttle.acquire("aws-conn").unwrap();

        // execute & verify:
        assert!(throttle.acquire("gcp-conn").is_ok());
    }

    #[test]
    fn test_waiting_caller_gets_the_freed_slot() {
        // setup:
        let throttle = Arc::new(ConnectionThrottle::new(1, 4, 1000));
        let permit = throttle.acquire("aws-conn").unwrap();

        let waiter = {
            let throttle = throttle.clone();
            thread::spawn(move || throttle.acquire("aws-conn").map(|_| ()))
        };

        // execute:
        thread::sleep(Duration::from_millis(50));
        drop(permit);

        // verify:
        assert!(waiter.join().unwrap().is_ok());
    }
}
