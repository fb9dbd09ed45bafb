//! Terminal rendering of the store-driven views: data sources, query
//! history, transcript, and backend/cluster status tables.
//!
//! Pure presentation over [`AppState`]; nothing here mutates the store.

use anyhow::Result;

use crate::backend::Backend;
use crate::cluster_client::{Cluster, ClusterClient};
use crate::models::{AiMessage, DataSourceStatus, MessageRole};
use crate::store::AppState;

/// Print backend reachability, connected data sources, and the cluster
/// table.
pub async fn print_status(
    state: &AppState,
    backend: &Backend,
    clusters: &ClusterClient,
) -> Result<()> {
    match backend.health().await {
        Ok(health) => {
            let service = health.service.unwrap_or_else(|| "backend".to_string());
            println!("backend   {}  {} ({})", backend.base_url(), health.status, service);
        }
        Err(_) => {
            println!("backend   {}  UNREACHABLE", backend.base_url());
        }
    }
    println!();

    if state.data_sources.is_empty() {
        println!("No data sources connected.");
    } else {
        println!("{:<10} {:<28} {:<20} {:<12} CONNECTED", "ID", "NAME", "KIND", "STATUS");
        for source in &state.data_sources {
            let status = match source.status {
                DataSourceStatus::Connected => "connected",
                DataSourceStatus::Disconnected => "disconnected",
                DataSourceStatus::Error => "error",
            };
            println!(
                "{:<10} {:<28} {:<20} {:<12} {}",
                short_id(&source.id),
                truncate(&source.name, 28),
                source.kind.label(),
                status,
                source.connected_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }
    println!();

    match clusters.list_clusters().await {
        Ok(list) => print_clusters(&list),
        Err(_) => println!("Cluster service unreachable."),
    }

    Ok(())
}

/// Print the cluster table.
pub fn print_clusters(clusters: &[Cluster]) {
    if clusters.is_empty() {
        println!("No clusters available.");
        return;
    }
    println!("{:<18} {:<28} {:<12} WORKERS", "CLUSTER", "NAME", "STATE");
    for cluster in clusters {
        println!(
            "{:<18} {:<28} {:<12} {}",
            cluster.cluster_id,
            truncate(&cluster.cluster_name, 28),
            cluster.state,
            cluster
                .num_workers
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}

/// Print the query history, newest last, with the active query marked.
pub fn print_queries(state: &AppState) {
    if state.queries.is_empty() {
        println!("No queries yet.");
        return;
    }
    for query in &state.queries {
        let marker = if state.active_query_id.as_deref() == Some(query.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} #{:<3} {:<10} {:<48} artifacts: {}",
            marker,
            query.number,
            short_id(&query.id),
            truncate(&query.prompt, 48),
            query.artifacts.len(),
        );
    }
}

/// Print one query's detail view: prompt, code, output, and artifacts.
pub fn print_query_detail(query: &crate::models::Query) {
    println!("#{} {}", query.number, query.prompt);
    println!("```");
    println!("{}", query.code);
    println!("```");
    if !query.output.is_empty() {
        println!("{}", query.output);
    }
    if query.artifacts.is_empty() {
        println!("No artifacts.");
    } else {
        for artifact in &query.artifacts {
            let title = artifact.title.as_deref().unwrap_or("untitled");
            println!("artifact: {:?} — {}", artifact.kind, title);
        }
    }
}

/// Print the assistant transcript.
pub fn print_transcript(state: &AppState) {
    if state.ai_messages.is_empty() {
        println!("Transcript is empty.");
        return;
    }
    for message in &state.ai_messages {
        print_message(message);
    }
}

/// Print one transcript message, with its code block and suggestion chips.
pub fn print_message(message: &AiMessage) {
    let speaker = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
    };
    println!("[{}] {}", speaker, message.content);
    if let Some(code) = &message.code {
        println!("```");
        println!("{code}");
        println!("```");
    }
    if let Some(suggestions) = &message.suggestions {
        for suggestion in suggestions {
            println!("  - {suggestion}");
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn short_id_handles_small_ids() {
        assert_eq!(short_id("abcdef01-2345"), "abcdef01");
        assert_eq!(short_id("tiny"), "tiny");
    }
}
