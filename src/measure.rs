// measure.rs — Tag presence polling + meter read pipeline

use crate::*;

/// A reader that can also tell which tag, if any, is in its field.
pub trait NfcController: PageTransport {
    fn poll_tag(&mut self) -> AppResult<Option<Uid>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagEvent {
    Idle,
    Removed,
    /// Same tag as last time, already handled.
    Present,
    Published,
    Failed,
}

/// Remembers the tag on the reader so it is read only once per visit.
#[derive(Debug, Default)]
pub struct TagTracker {
    last_uid: Option<Uid>,
}

impl TagTracker {
    pub fn last_uid(&self) -> Option<&Uid> {
        self.last_uid.as_ref()
    }

    /// Poll the reader once and read the tag if it is new.
    ///
    /// Failures never clear a report published earlier. A tag that failed
    /// with a transport error is tried again on the next poll, other
    /// failures wait until the tag is taken away.
    pub async fn process_tag_event<C: NfcController>(&mut self, controller: &mut C, state: &MyState) -> TagEvent {
        let uid = match controller.poll_tag() {
            Ok(Some(uid)) => uid,
            Ok(None) => {
                if let Some(uid) = self.last_uid.take() {
                    info!("NFC: tag {} removed", format_uid(&uid));
                    return TagEvent::Removed;
                }
                return TagEvent::Idle;
            }
            Err(e) => {
                error!("NFC: {e}");
                state.count_error();
                return TagEvent::Failed;
            }
        };

        if self.last_uid.as_ref() == Some(&uid) {
            return TagEvent::Present;
        }
        self.last_uid = Some(uid.clone());

        let policy = state.config.read().await.read_policy();
        match read_meter(controller, &uid, &policy) {
            Ok(report) => {
                for w in &report.warnings {
                    warn!("Meter: {} {w}", report.uid);
                }
                info!("Meter: {} {}", report.uid, report.json);
                state.publish(report).await;
                TagEvent::Published
            }
            Err(e) => {
                let errors = state.count_error();
                error!("Meter: no reading from {} ({errors} errors so far): {e}", format_uid(&uid));
                if matches!(e, AppError::Transport { .. }) {
                    self.last_uid = None;
                }
                TagEvent::Failed
            }
        }
    }
}

pub async fn poll_tags<C: NfcController>(state: Arc<Pin<Box<MyState>>>, mut controller: C) -> anyhow::Result<()> {
    let mut tracker = TagTracker::default();
    info!("Waiting for tags...");

    loop {
        tracker.process_tag_event(&mut controller, &state).await;
        let interval = state.config.read().await.poll_interval();
        sleep(interval).await;
    }
}


// EOF
