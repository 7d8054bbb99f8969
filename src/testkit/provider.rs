//! Scripted [`ProviderGateway`] for tests.
//!
//! Each `fetch_balance` pops the next scripted result; once the queue is
//! empty the fallback balance is returned. An optional delay widens the
//! window for concurrency tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{DomainError, ProviderCredential, ProviderId, SettledBet};
use crate::error::Result;
use crate::port::ProviderGateway;

#[derive(Default)]
struct Script {
    balances: VecDeque<std::result::Result<Decimal, DomainError>>,
    pulls: VecDeque<std::result::Result<Vec<SettledBet>, DomainError>>,
    since: Vec<Option<DateTime<Utc>>>,
}

/// A provider gateway with queued responses.
#[derive(Clone)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
    fallback: Decimal,
    delay: Duration,
    balance_calls: Arc<AtomicU32>,
    pull_calls: Arc<AtomicU32>,
}

impl ScriptedGateway {
    /// Gateway that always reports `balance`.
    pub fn new(balance: Decimal) -> Self {
        Self {
            script: Arc::default(),
            fallback: balance,
            delay: Duration::ZERO,
            balance_calls: Arc::new(AtomicU32::new(0)),
            pull_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue balance results ahead of the fallback.
    pub fn with_balances(self, results: Vec<std::result::Result<Decimal, DomainError>>) -> Self {
        self.script.lock().balances.extend(results);
        self
    }

    /// Queue `n` provider outages.
    pub fn failing(self, n: usize) -> Self {
        let outages = (0..n)
            .map(|_| {
                Err(DomainError::ProviderUnavailable {
                    provider: ProviderId::new("scripted"),
                    reason: "scripted outage".into(),
                })
            })
            .collect();
        self.with_balances(outages)
    }

    /// Queue one history pull result.
    pub fn push_pull(&self, result: std::result::Result<Vec<SettledBet>, DomainError>) {
        self.script.lock().pulls.push_back(result);
    }

    pub fn balance_calls(&self) -> u32 {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> u32 {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// The `since` argument of every history pull, in call order.
    pub fn pulled_since(&self) -> Vec<Option<DateTime<Utc>>> {
        self.script.lock().since.clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn fetch_balance(
        &self,
        _provider: &ProviderId,
        _credential: &ProviderCredential,
        _username: &str,
    ) -> Result<Decimal> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let next = self.script.lock().balances.pop_front();
        match next {
            Some(result) => result.map_err(Into::into),
            None => Ok(self.fallback),
        }
    }

    async fn pull_settled(
        &self,
        _provider: &ProviderId,
        _credential: &ProviderCredential,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SettledBet>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let next = {
            let mut script = self.script.lock();
            script.since.push(since);
            script.pulls.pop_front()
        };
        match next {
            Some(result) => result.map_err(Into::into),
            None => Ok(Vec::new()),
        }
    }
}
