//! Routing of autonomous (TCID 0) ONU notifications.

use crate::error::{Error, Result};
use crate::wire::OmciFrame;

/// Consumer of autonomous ONU notifications.
///
/// The receive path dispatches on the decoded operation; one method per
/// notification kind. Autonomous operations outside this set are counted as
/// discards by the channel itself.
pub trait OnuMessageSink: Send + Sync {
    fn alarm_notification(&self, frame: &OmciFrame) -> Result<()>;
    fn attribute_value_change(&self, frame: &OmciFrame) -> Result<()>;
    fn test_result(&self, frame: &OmciFrame) -> Result<()>;
}

/// Default sink: logs each notification and reports it unsupported.
#[derive(Debug, Default)]
pub struct UnhandledOnuSink;

impl OnuMessageSink for UnhandledOnuSink {
    fn alarm_notification(&self, frame: &OmciFrame) -> Result<()> {
        tracing::info!(contents = ?frame.contents, "unhandled ONU alarm notification");
        Err(Error::UnsupportedMessage("alarm notification".into()))
    }

    fn attribute_value_change(&self, frame: &OmciFrame) -> Result<()> {
        tracing::info!(contents = ?frame.contents, "unhandled attribute value change");
        Err(Error::UnsupportedMessage("attribute value change".into()))
    }

    fn test_result(&self, frame: &OmciFrame) -> Result<()> {
        tracing::info!(contents = ?frame.contents, "unhandled test result");
        Err(Error::UnsupportedMessage("test result".into()))
    }
}
