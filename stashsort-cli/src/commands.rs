//! Command execution.

use crate::render;
use crate::Commands;
use colored::Colorize;
use parking_lot::Mutex;
use stashsort_capture::Pipeline;
use stashsort_core::{ContainerKind, PlacementKind, SortReport, SortStatus};
use stashsort_protocol::{Message, StreamKey};
use stashsort_service::StashService;
use stashsort_storage::Persisted;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::sync::Arc;

/// Executes a command and returns the formatted output.
pub fn execute(service: &StashService, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Config => Ok(serde_yaml::to_string(service.config())?
            .trim_end()
            .to_string()),

        Commands::Characters => {
            let characters = service.characters();
            if characters.is_empty() {
                return Ok("No characters captured".yellow().to_string());
            }

            let active = service.active_character();
            let mut output = String::new();
            for id in characters {
                let snapshot = service.cache().character(id)?;
                let marker = if Some(id) == active { "*" } else { " " };
                output.push_str(&format!(
                    "{} {}  {} ({} lv{})  {} items\n",
                    marker.green(),
                    id.to_string().cyan(),
                    snapshot.nickname.bold(),
                    snapshot.class,
                    snapshot.level,
                    snapshot.item_count()
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::Show {
            character,
            container,
        } => {
            let kind = parse_container(&container)?;
            let snapshot = service.cache().character(character)?;
            let items = service.snapshot(character, kind)?;

            let body = if kind.dimensions().is_some() {
                render::grid(&snapshot.grid(kind)?)
            } else {
                render::slot_list(kind, &items)
            };
            Ok(format!(
                "{}\n{}\n{}",
                format!("{} / {} ({} items)", snapshot.nickname, kind, items.len()).bold(),
                body,
                render::legend()
            ))
        }

        Commands::Plan {
            character,
            container,
            json,
        } => {
            let kind = parse_container(&container)?;
            let (report, grid) = service.plan(Some(character), kind)?;
            if json {
                return Ok(serde_json::to_string_pretty(&report.placements)?);
            }
            Ok(format!(
                "{}\n{}\n{}",
                format_report(&report),
                render::grid(&grid),
                render::legend()
            ))
        }

        Commands::Decode { file, dry_run } => decode(service, &file, dry_run),
    }
}

fn parse_container(s: &str) -> Result<ContainerKind, String> {
    ContainerKind::parse(s).ok_or_else(|| format!("unknown container '{}'", s))
}

fn format_report(report: &SortReport) -> String {
    let mut output = String::new();
    for (n, op) in report.placements.iter().enumerate() {
        let verb = match op.kind {
            PlacementKind::Place => "place".green(),
            PlacementKind::Displace => "displace".yellow(),
        };
        output.push_str(&format!(
            "{:>4}. {:<8} {} [{}] {} -> {}\n",
            n + 1,
            verb,
            op.name.cyan(),
            op.footprint,
            op.from,
            op.to
        ));
    }

    let status = match &report.status {
        SortStatus::Completed => "Completed".green(),
        SortStatus::Cancelled => "Cancelled".yellow(),
        SortStatus::Failed(f) => format!("Failed: {}", f).red(),
    };
    output.push_str(&format!(
        "{}: {} moves ({} displacements), {} unchanged",
        status,
        report.placements.len(),
        report.displacements(),
        report.unchanged
    ));
    output
}

/// Feeds a payload dump through reassembly and routing, then persists each
/// decoded message like a live capture would.
fn decode(
    service: &StashService,
    file: &Path,
    dry_run: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let payload = std::fs::read(file)?;

    let decoded = Arc::new(Mutex::new(Vec::new()));
    let sink_decoded = decoded.clone();
    let mut pipeline = Pipeline::new(
        service.config().protocol.reassembly_config(),
        Arc::new(move |m: Message| sink_decoded.lock().push(m)),
    );
    let key = StreamKey::new(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, service.config().capture.port_low),
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
    );
    pipeline.handle_payload(key, &payload);
    let stats = pipeline.stats();

    let messages = std::mem::take(&mut *decoded.lock());
    let mut output = format!(
        "{} {} bytes: {} frames, {} discarded, {} messages\n",
        "Decoded".green(),
        payload.len(),
        stats.frames_decoded(),
        stats.frames_discarded(),
        messages.len()
    );

    for message in &messages {
        let name = message.command().name();
        if dry_run {
            output.push_str(&format!("  {}\n", name.cyan()));
            continue;
        }
        match service.cache().ingest(message)? {
            Persisted::Character { character_id, path } => output.push_str(&format!(
                "  {} character {} -> {}\n",
                name.cyan(),
                character_id,
                path.display()
            )),
            Persisted::Diagnostic { path } => {
                output.push_str(&format!("  {} -> {}\n", name.cyan(), path.display()))
            }
        }
    }
    Ok(output.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use prost::Message as _;
    use stashsort_capture::UnavailableBackend;
    use stashsort_core::DryRunActuator;
    use stashsort_protocol::{
        CharacterDataBase, CharacterInfoResponse, CharacterListResponse, Frame, ItemInfo,
        StorageInfo,
    };
    use stashsort_service::Config;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> StashService {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        StashService::new(
            config,
            Arc::new(UnavailableBackend),
            Box::new(DryRunActuator::default()),
        )
        .unwrap()
    }

    fn dump(dir: &TempDir) -> std::path::PathBuf {
        let detail = CharacterInfoResponse {
            result: 1,
            character_data_base: Some(CharacterDataBase {
                character_id: 12,
                storage_infos: vec![StorageInfo {
                    inventory_id: 4,
                    items: vec![ItemInfo {
                        item_unique_id: 5,
                        item_id: "DesignDataItem:Id_Item_Lantern_2001".to_string(),
                        item_count: 1,
                        inventory_id: 4,
                        slot_id: Some(17),
                        ..Default::default()
                    }],
                }],
                ..Default::default()
            }),
        };
        let list = CharacterListResponse::default();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\x01\x02\x03");
        bytes.extend_from_slice(
            &Frame::new(18, Bytes::from(list.encode_to_vec()))
                .encode()
                .unwrap(),
        );
        bytes.extend_from_slice(
            &Frame::new(44, Bytes::from(detail.encode_to_vec()))
                .encode()
                .unwrap(),
        );
        let path = dir.path().join("dump.bin");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_persists_messages() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let file = dump(&dir);

        let output = decode(&service, &file, false).unwrap();
        assert!(output.contains("2 messages"));
        assert_eq!(service.characters(), vec![12]);
        assert!(dir.path().join("data").join("12.json").exists());

        let stash = service.snapshot(12, ContainerKind::Storage).unwrap();
        assert_eq!(stash[0].display_name, "Lantern");
        assert_eq!(stash[0].slot_index, 17);
    }

    #[test]
    fn test_decode_dry_run() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let file = dump(&dir);

        decode(&service, &file, true).unwrap();
        assert!(service.characters().is_empty());
        assert!(!dir.path().join("data").join("12.json").exists());
    }

    #[test]
    fn test_unknown_container() {
        assert!(parse_container("attic").is_err());
        assert_eq!(parse_container("stash").unwrap(), ContainerKind::Storage);
    }
}
