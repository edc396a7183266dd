//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with all available endpoints and descriptions.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::{format_uptime, FOOTER_TEXT};
use crate::state::SharedState;

const ENDPOINTS: &[(&str, &str)] = &[
    ("/scan", "Latest classification result, add ?refresh=true to rescan (JSON)"),
    ("/services/unnecessary", "Running services from the unnecessary list (JSON)"),
    ("/policy", "Effective policy tables and thresholds (JSON)"),
    ("/health", "Server health and last scan status (text)"),
    ("/metrics", "Prometheus-compatible metrics endpoint"),
];

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");
    let git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    let uptime_str = format_uptime(state.start_time.elapsed().as_secs());

    let items: String = ENDPOINTS
        .iter()
        .map(|(path, desc)| {
            format!(
                "        <li>\n            <a href=\"{path}\">{path}</a>\n            <div class=\"endpoint-desc\">{desc}</div>\n        </li>\n"
            )
        })
        .collect();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>procwarden</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #333;
            border-bottom: 3px solid #b02a37;
            padding-bottom: 15px;
        }}
        .endpoint-list {{ list-style: none; padding: 0; }}
        .endpoint-list li {{
            margin: 20px 0;
            padding: 15px;
            background: #f8f9fa;
            border-left: 4px solid #b02a37;
            border-radius: 4px;
        }}
        .endpoint-list a {{ color: #b02a37; text-decoration: none; font-weight: 600; }}
        .endpoint-desc {{ color: #666; margin-top: 5px; }}
        .footer {{ margin-top: 40px; color: #666; font-size: 0.9em; text-align: center; }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
<div class="container">
    <h1>procwarden</h1>
    <p>Version <b>{version}</b> ({git_sha}) &middot; uptime {uptime} &middot; source <b>{source}</b></p>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
{items}        <li>
            <code>POST /actions</code>
            <div class="endpoint-desc">Body <code>{{"entity": {{"kind": "process", "pid": 42}}, "action": "terminate", "force": false}}</code></div>
        </li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        git_sha = git_sha,
        uptime = uptime_str,
        source = if state.config.test_data_file.is_some() { "snapshot file" } else { "live host" },
        items = items,
        footer = FOOTER_TEXT
    );

    Html(html)
}
