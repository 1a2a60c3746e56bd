use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use cfbypass_integrations::{
    BypassClient,
    BypassMiddleware,
    BypassOptions,
    CaptureOptions,
    VERSION,
};
use tokio::runtime::Runtime;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_bool(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

fn or_default(input: String, default: &str) -> String {
    if input.is_empty() {
        default.to_string()
    } else {
        input
    }
}

#[test]
#[ignore = "Requires a running bypass service and manual input"]
fn interactive_live_service() -> Result<(), Box<dyn Error>> {
    println!("cfbypass-integrations {} interactive smoke test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let service_url = or_default(
        prompt("Bypass service URL [http://localhost:3001]:")?,
        "http://localhost:3001",
    );
    let target_url = or_default(
        prompt("Target URL [https://example.com]:")?,
        "https://example.com",
    );
    let save_answer = prompt("Save screenshot to capture.png? (y/N):")?;
    let fallback_answer = prompt("Fall back to normal capture on failure? (Y/n):")?;

    let runtime = Runtime::new()?;
    let client = BypassClient::new(service_url.clone())?;

    println!("\nWaiting for service...");
    runtime.block_on(client.wait_for_service(10, Duration::from_secs(2)))?;
    println!("Service ready!");

    let detection = runtime.block_on(client.detect(&target_url))?;
    println!("Cloudflare detected: {}", detection.cloudflare_detected);

    let result = runtime.block_on(client.bypass(&target_url, &BypassOptions::default()))?;
    println!("Final URL: {}", result.final_url.as_deref().unwrap_or(&target_url));
    println!("Title: {}", result.title);
    println!("Bypass successful: {}", result.bypass_successful);
    println!("Cookies: {} cookies", result.cookies.len());

    if parse_bool(&save_answer, false)
        && let Some(ref screenshot) = result.screenshot
    {
        runtime.block_on(BypassClient::save_screenshot(screenshot, "capture.png"))?;
        println!("Screenshot saved to capture.png");
    }

    let mut builder = BypassMiddleware::builder().with_service_url(service_url);
    if !parse_bool(&fallback_answer, true) {
        builder = builder.disable_fallback();
    }
    let middleware = builder.build()?;

    let outcome = runtime.block_on(middleware.capture_with_fallback(
        &target_url,
        |url, _options| async move {
            Ok::<_, io::Error>(serde_json::json!({ "screenshot": null, "url": url }))
        },
        &CaptureOptions::default(),
    ))?;
    println!("Routed through bypass service: {}", outcome.is_bypassed());
    if let Some(stats) = middleware.metrics() {
        println!(
            "Routing stats -> checks: {}, bypasses: {}, fallbacks: {}",
            stats.availability_checks,
            stats.bypass_attempts(),
            stats.fallbacks
        );
    }

    println!("Interactive test complete. Re-run with different inputs as needed.");
    Ok(())
}
