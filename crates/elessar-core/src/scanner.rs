// ── Advertisement scanner seam ──
//
// The radio itself is a platform concern. The beacon manager only needs
// to open and close a scan window and read what was heard in between.

use std::future::Future;

use crate::beacon::matcher::Advertisement;
use crate::error::CoreError;

/// Platform BLE scanner driven by the sweep loop.
pub trait AdvertisementScanner: Send + Sync + 'static {
    /// Open a scan window. Forgets advertisements from earlier windows.
    fn start(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Close the current scan window.
    fn stop(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Latest advertisement per device heard since the last `start`.
    fn advertisements(&self) -> impl Future<Output = Result<Vec<Advertisement>, CoreError>> + Send;
}
