//! Plugin-shaped entry point for host integrations.

use std::future::Future;

use super::{BypassMiddleware, CaptureOptions, CaptureOutcome, FallbackError, MiddlewareError};

/// Wraps a [`BypassMiddleware`] behind a single capture hook.
///
/// ```no_run
/// use cfbypass_integrations::{BypassPlugin, CaptureOptions};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let plugin = BypassPlugin::new("http://cloudflare-bypass:3001")?;
/// let outcome = plugin
///     .process_capture(
///         "https://example.com",
///         |url, _options| async move { Ok::<_, std::io::Error>(url) },
///         &CaptureOptions::default(),
///     )
///     .await?;
/// println!("bypassed: {}", outcome.is_bypassed());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BypassPlugin {
    middleware: BypassMiddleware,
}

impl BypassPlugin {
    pub fn new(service_url: impl Into<String>) -> Result<Self, MiddlewareError> {
        Ok(Self {
            middleware: BypassMiddleware::new(service_url)?,
        })
    }

    pub fn from_middleware(middleware: BypassMiddleware) -> Self {
        Self { middleware }
    }

    pub fn middleware(&self) -> &BypassMiddleware {
        &self.middleware
    }

    /// Capture hook; same contract as
    /// [`BypassMiddleware::capture_with_fallback`].
    pub async fn process_capture<F, Fut, T, E>(
        &self,
        url: &str,
        normal_capture: F,
        options: &CaptureOptions,
    ) -> Result<CaptureOutcome<T>, FallbackError<E>>
    where
        F: FnOnce(String, CaptureOptions) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.middleware
            .capture_with_fallback(url, normal_capture, options)
            .await
    }
}
