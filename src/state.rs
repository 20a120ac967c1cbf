// state.rs

use std::sync::atomic::{AtomicU32, Ordering};

use crate::*;

pub struct MyState {
    pub config: RwLock<MyConfig>,
    pub uptime: RwLock<usize>,
    pub tags_read: AtomicU32,
    pub read_errors: AtomicU32,
    pub latest_report: RwLock<Option<MeterReport>>,
    pub data_updated: RwLock<bool>,
}

impl MyState {
    pub fn new(config: MyConfig) -> Self {
        MyState {
            config: RwLock::new(config),
            uptime: RwLock::new(0),
            tags_read: 0.into(),
            read_errors: 0.into(),
            latest_report: RwLock::new(None),
            data_updated: RwLock::new(false),
        }
    }

    /// Replace the latest report and flag it for the publisher.
    pub async fn publish(&self, report: MeterReport) {
        self.tags_read.fetch_add(1, Ordering::Relaxed);
        *self.latest_report.write().await = Some(report);
        *self.data_updated.write().await = true;
    }

    pub fn count_error(&self) -> u32 {
        self.read_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The latest report if it has not been taken since it was published.
    pub async fn take_update(&self) -> Option<MeterReport> {
        let mut fresh_data = self.data_updated.write().await;
        if !*fresh_data {
            return None;
        }
        *fresh_data = false;
        self.latest_report.read().await.clone()
    }

    pub fn counters(&self) -> (u32, u32) {
        (
            self.tags_read.load(Ordering::Relaxed),
            self.read_errors.load(Ordering::Relaxed),
        )
    }
}


// EOF
