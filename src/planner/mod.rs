//! Planner: maps (FileRecord, Classification) pairs to destination paths,
//! sanitizes names, resolves collisions, and emits plan artifacts
//! (spec §4.5).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{AppConfig, COLLISION_VERSION_CAP};
use crate::error::{OrganizerError, Result};
use crate::model::{Action, Category, Classification, FileRecord, Plan, PlanItem};

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_BASE_NAME_LEN: usize = 200;

/// Removes filesystem-hostile characters, collapses whitespace, strips
/// leading/trailing whitespace and dots, and truncates to 200 characters
/// while preserving the extension (spec §4.5 step 2).
pub fn sanitize_base_name(suggested_name: &str, extension: &str) -> String {
    let mut cleaned: String = suggested_name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();

    cleaned = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    let trimmed = cleaned.trim_matches(|c: char| c.is_whitespace() || c == '.');

    let suffix = if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    };

    let budget = MAX_BASE_NAME_LEN.saturating_sub(suffix.len());
    let mut truncated = String::new();
    for ch in trimmed.chars() {
        if truncated.len() + ch.len_utf8() > budget {
            break;
        }
        truncated.push(ch);
    }

    format!("{truncated}{suffix}")
}

/// Idempotent: sanitizing an already-sanitized name is a no-op.
pub fn is_sanitized(name: &str) -> bool {
    !name.chars().any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control())
}

fn destination_dir(base_root: &Path, classification: &Classification) -> PathBuf {
    let mut dir = base_root.join(classification.category.as_str());
    if !classification.subcategory.trim().is_empty() {
        dir = dir.join(classification.subcategory.trim());
    }
    if classification.year != 0 {
        dir = dir.join(classification.year.to_string());
    }
    dir
}

/// Appends `_v2`, `_v3`, ... before the extension until `candidate` is not
/// in `taken`. The first conflict starts at `_v2` (spec §4.5 step 4 /
/// §9 Open Question).
pub fn resolve_collision(candidate: &Path, taken: &HashSet<PathBuf>) -> Result<PathBuf> {
    if !taken.contains(candidate) {
        return Ok(candidate.to_path_buf());
    }

    let parent = candidate.parent().unwrap_or_else(|| Path::new(""));
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = candidate.extension().map(|e| e.to_string_lossy().into_owned());

    for version in 2..=COLLISION_VERSION_CAP {
        let name = match &ext {
            Some(ext) => format!("{stem}_v{version}.{ext}"),
            None => format!("{stem}_v{version}"),
        };
        let attempt = parent.join(name);
        if !taken.contains(&attempt) {
            return Ok(attempt);
        }
    }

    Err(OrganizerError::Collision {
        base_name: stem,
        cap: COLLISION_VERSION_CAP,
    })
}

struct PlanInput<'a> {
    record: &'a FileRecord,
    classification: &'a Classification,
}

/// Builds a Plan from classified records. Items are ordered by source path
/// lex order for deterministic collision resolution (spec §5, §9).
pub fn build_plan(
    config: &AppConfig,
    mut inputs: Vec<(FileRecord, Classification)>,
    existing_paths: &HashSet<PathBuf>,
) -> Result<Plan> {
    inputs.sort_by(|a, b| a.0.path.cmp(&b.0.path));

    let mut taken: HashSet<PathBuf> = existing_paths.clone();
    let mut items = Vec::with_capacity(inputs.len());

    for (record, classification) in &inputs {
        let item = plan_one(
            config,
            PlanInput {
                record,
                classification,
            },
            &mut taken,
        )?;
        if let Some(dest) = &item.destination {
            taken.insert(dest.clone());
        }
        items.push(item);
    }

    Ok(Plan {
        plan_id: Uuid::new_v4().to_string(),
        generated_at: Utc::now(),
        base_root: config.base_root.clone(),
        items,
    })
}

fn plan_one(config: &AppConfig, input: PlanInput<'_>, taken: &mut HashSet<PathBuf>) -> Result<PlanItem> {
    let PlanInput { record, classification } = input;

    let below_threshold = classification.confidence < config.confidence_threshold;
    let effective_category = if below_threshold {
        Category::inbox()
    } else {
        classification.category
    };

    let mut effective = classification.clone();
    effective.category = effective_category;

    let dest_dir = destination_dir(&config.base_root, &effective);
    let base_name = sanitize_base_name(&classification.suggested_name, &record.extension);
    let candidate = dest_dir.join(&base_name);

    let candidate = if candidate == record.path {
        candidate
    } else {
        resolve_collision(&candidate, taken)?
    };

    let reason = if below_threshold {
        format!(
            "confidence {} below threshold {}, original category {}",
            classification.confidence,
            config.confidence_threshold,
            classification.category
        )
    } else {
        classification.rationale.clone()
    };

    let action = select_action(&record.path, &candidate, config.copy_mode);

    info!(
        source = %record.path.display(),
        destination = %candidate.display(),
        action = ?action,
        "planned item"
    );

    Ok(PlanItem {
        action,
        source: record.path.clone(),
        destination: if action == Action::Skip { None } else { Some(candidate) },
        reason,
        confidence: classification.confidence,
        rule_id: match &classification.source {
            crate::model::ClassificationSource::Rule(id) => Some(id.clone()),
            _ => None,
        },
        llm_used: classification.llm_used(),
        source_hash: record.sha256.clone(),
        source_size: record.size_bytes,
    })
}

fn select_action(source: &Path, destination: &Path, copy_mode: bool) -> Action {
    if source == destination {
        return Action::Skip;
    }
    if copy_mode {
        return Action::Copy;
    }
    match (source.parent(), destination.parent()) {
        (Some(a), Some(b)) if a == b => Action::Rename,
        _ => Action::Move,
    }
}

/// Human-readable plan summary (spec §4.5's second artifact).
pub fn render_human_summary(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Plan {}\n\n", plan.plan_id));
    out.push_str(&format!("Generated: {}\n", plan.generated_at.to_rfc3339()));
    out.push_str(&format!("Base root: {}\n\n", plan.base_root.display()));

    out.push_str("## Counts by action\n\n");
    for (action, count) in plan.counts_by_action() {
        out.push_str(&format!("- {action:?}: {count}\n"));
    }

    out.push_str("\n## Items\n\n");
    for item in &plan.items {
        let dest = item
            .destination
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        out.push_str(&format!(
            "- [{:?}] {} -> {} (confidence {}, {})\n",
            item.action,
            item.source.display(),
            dest,
            item.confidence,
            item.reason
        ));
    }

    out
}

#[derive(Serialize)]
struct PlanFileNames {
    structured: String,
    human: String,
}

/// Computes the two artifact filenames for a plan, timestamped to the
/// second (spec §4.5 / §6).
pub fn artifact_names(plan: &Plan) -> (String, String) {
    let ts = plan.generated_at.format("%Y%m%d_%H%M%S");
    (format!("plan_{ts}.json"), format!("plan_{ts}.md"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassificationSource;

    fn classification(category: Category, confidence: u8) -> Classification {
        Classification {
            category,
            subcategory: "Midia/Imagens".into(),
            subject: "IMG 0001".into(),
            year: 2024,
            suggested_name: "2024-05-01__05_Pessoal__IMG_0001".into(),
            confidence,
            rationale: "test".into(),
            source: ClassificationSource::Rule("images".into()),
        }
    }

    fn record(path: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size_bytes: 2 * 1024 * 1024,
            modified_at: None,
            created_at: None,
            extension: "jpg".into(),
            mime_guess: None,
            sha256: "hash".into(),
            excerpt: None,
        }
    }

    #[test]
    fn sanitize_removes_forbidden_characters_and_collapses_whitespace() {
        let result = sanitize_base_name("2024-05-01__05_Pessoal__My: File?", "jpg");
        assert!(!result.chars().any(|c| FORBIDDEN_CHARS.contains(&c)));
        assert!(result.ends_with(".jpg"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_base_name("weird<>name  with  spaces", "txt");
        let twice = sanitize_base_name(&once.trim_end_matches(".txt"), "txt");
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitize_truncates_to_200_chars_preserving_extension() {
        let long_name = "x".repeat(500);
        let result = sanitize_base_name(&long_name, "txt");
        assert!(result.len() <= MAX_BASE_NAME_LEN);
        assert!(result.ends_with(".txt"));
    }

    #[test]
    fn collision_resolution_starts_at_v2() {
        let candidate = PathBuf::from("/out/05_Pessoal/2024/photo.jpg");
        let mut taken = HashSet::new();
        taken.insert(candidate.clone());
        let resolved = resolve_collision(&candidate, &taken).unwrap();
        assert_eq!(resolved, PathBuf::from("/out/05_Pessoal/2024/photo_v2.jpg"));

        taken.insert(resolved);
        let resolved2 = resolve_collision(&candidate, &taken).unwrap();
        assert_eq!(resolved2, PathBuf::from("/out/05_Pessoal/2024/photo_v3.jpg"));
    }

    #[test]
    fn low_confidence_routes_to_inbox() {
        let cfg = AppConfig {
            base_root: PathBuf::from("/out"),
            confidence_threshold: 85,
            ..AppConfig::default()
        };
        let input = vec![(record("/in/photo.jpg"), classification(Category::Trabalho, 70))];
        let plan = build_plan(&cfg, input, &HashSet::new()).unwrap();
        let item = &plan.items[0];
        assert!(item
            .destination
            .as_ref()
            .unwrap()
            .starts_with("/out/90_Inbox_Organizar"));
        assert!(item.reason.contains("below threshold"));
    }

    #[test]
    fn two_files_same_destination_get_stable_v2_suffix() {
        let cfg = AppConfig {
            base_root: PathBuf::from("/out"),
            confidence_threshold: 50,
            ..AppConfig::default()
        };
        let mut class_a = classification(Category::Pessoal, 95);
        class_a.suggested_name = "2024-01-01__05_Pessoal__a".into();
        let mut class_b = class_a.clone();
        class_b.suggested_name = class_a.suggested_name.clone();

        let inputs = vec![
            (
                FileRecord { path: PathBuf::from("/in/a.pdf"), extension: "pdf".into(), ..record("/in/a.pdf") },
                class_a,
            ),
            (
                FileRecord { path: PathBuf::from("/in/sub/a.pdf"), extension: "pdf".into(), ..record("/in/sub/a.pdf") },
                class_b,
            ),
        ];
        let plan = build_plan(&cfg, inputs, &HashSet::new()).unwrap();
        let dest_a = plan.items[0].destination.clone().unwrap();
        let dest_b = plan.items[1].destination.clone().unwrap();
        assert_ne!(dest_a, dest_b);
        assert!(dest_b.to_string_lossy().contains("_v2"));
    }

    #[test]
    fn identical_source_and_destination_is_skip() {
        let cfg = AppConfig {
            base_root: PathBuf::from("/in"),
            confidence_threshold: 50,
            ..AppConfig::default()
        };
        let mut class = classification(Category::Pessoal, 95);
        class.subcategory = String::new();
        class.year = 0;
        class.suggested_name = "photo".into();
        let rec = record("/in/05_Pessoal/photo.jpg");
        let plan = build_plan(&cfg, vec![(rec, class)], &HashSet::new()).unwrap();
        assert_eq!(plan.items[0].action, Action::Skip);
        assert!(plan.items[0].destination.is_none());
    }
}
