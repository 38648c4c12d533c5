use common::windows::FileMatch;
use serde_json::{json, Value};

/// Flat table row for one match. Column order is fixed: computer, volume
/// serial, full path, file reference number, parent reference number, size,
/// rule description, standard-information timestamps, file-name timestamps,
/// MD5, SHA-1, SHA-256, snapshot GUID
pub fn match_to_row(file_match: &FileMatch) -> Vec<String> {
    let full_path = file_match
        .names
        .first()
        .map(|name| name.full_path.clone())
        .unwrap_or_default();
    let (md5, sha1, sha256) = file_match
        .attributes
        .first()
        .map(|attr| (attr.md5.clone(), attr.sha1.clone(), attr.sha256.clone()))
        .unwrap_or_default();

    let empty = String::new();
    let (si_created, si_modified, si_accessed, si_changed) =
        match &file_match.standard_information {
            Some(info) => (
                info.created.clone(),
                info.modified.clone(),
                info.accessed.clone(),
                info.changed.clone(),
            ),
            None => (empty.clone(), empty.clone(), empty.clone(), empty.clone()),
        };
    let (fn_created, fn_modified, fn_accessed, fn_changed) = match &file_match.filename_times {
        Some(times) => (
            times.created.clone(),
            times.modified.clone(),
            times.accessed.clone(),
            times.changed.clone(),
        ),
        None => (empty.clone(), empty.clone(), empty.clone(), empty),
    };

    vec![
        file_match.computer.clone(),
        format!("{:#018x}", file_match.volume_serial),
        full_path,
        format!("{:#018x}", file_match.frn),
        format!("{:#018x}", file_match.parent_frn),
        file_match.size.to_string(),
        file_match.rule.clone(),
        si_created,
        si_modified,
        si_accessed,
        si_changed,
        fn_created,
        fn_modified,
        fn_accessed,
        fn_changed,
        md5,
        sha1,
        sha256,
        file_match.snapshot_id.clone(),
    ]
}

/// Structured tree for one match. Element names are fixed: `record`,
/// `standardinformation`, `filename`, `i30`, `data`
pub fn match_to_tree(file_match: &FileMatch) -> Value {
    let mut record = json!({
        "computer": file_match.computer,
        "volume_serial": format!("{:#018x}", file_match.volume_serial),
        "frn": format!("{:#018x}", file_match.frn),
        "parent_frn": format!("{:#018x}", file_match.parent_frn),
        "size": file_match.size,
        "rule": file_match.rule,
        "deleted": file_match.deleted,
        "snapshot_id": file_match.snapshot_id,
    });

    if let Some(info) = &file_match.standard_information {
        record["standardinformation"] = json!({
            "created": info.created,
            "modified": info.modified,
            "accessed": info.accessed,
            "changed": info.changed,
            "file_attributes": info.file_attributes,
            "usn": info.usn,
            "security_id": info.security_id,
        });
    }

    let filenames: Vec<Value> = file_match
        .names
        .iter()
        .map(|name| {
            json!({
                "name": name.file_name,
                "full_path": name.full_path,
            })
        })
        .collect();
    record["filename"] = Value::Array(filenames);

    if let Some(entry) = &file_match.i30 {
        record["i30"] = json!({
            "parent_frn": format!("{:#018x}", entry.parent_frn),
            "carved": entry.carved,
        });
    }

    let data: Vec<Value> = file_match
        .attributes
        .iter()
        .map(|attr| {
            json!({
                "attr_type": attr.attr_type,
                "instance": attr.instance,
                "name": attr.name,
                "size": attr.size,
                "md5": attr.md5,
                "sha1": attr.sha1,
                "sha256": attr.sha256,
                "matched_rules": attr.matched_rules,
            })
        })
        .collect();
    record["data"] = Value::Array(data);

    json!({ "record": record })
}
