//! 图片收集 - 业务能力层
//!
//! 组的图片取自第一个子题的 image_1..image_7，
//! 多模态后端编码为 base64 data URL，
//! 纯文本后端读取图片旁边的 OCR 文本侧文件（{图片路径}.txt）。

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::models::group::QuestionGroup;
use crate::services::backend::BackendCapability;

/// 收集一个组要传给后端的图片内容
///
/// 图片文件缺失是该组的失败（调用方隔离），不是整个批次的失败。
pub fn collect_group_images(
    group: &QuestionGroup,
    parent_dir: &str,
    capability: BackendCapability,
) -> Result<Vec<String>> {
    let mut images = Vec::new();

    for rel_path in group.image_paths() {
        let image_path = Path::new(parent_dir).join(&rel_path);

        match capability {
            BackendCapability::Vision => {
                let bytes = std::fs::read(&image_path)
                    .with_context(|| format!("无法读取图片: {}", image_path.display()))?;
                images.push(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)));
            }
            BackendCapability::Text | BackendCapability::Reasoning => {
                // 纯文本后端：用预先提取好的 OCR 文本代替图片
                let ocr_path = image_path.with_extension(format!(
                    "{}.txt",
                    image_path
                        .extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ));
                let text = std::fs::read_to_string(&ocr_path)
                    .with_context(|| format!("无法读取 OCR 文本: {}", ocr_path.display()))?;
                images.push(text.trim().to_string());
            }
        }
    }

    if !images.is_empty() {
        debug!("组 {} 收集到 {} 张图片", group.key(), images.len());
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::QuestionRecord;

    fn group_with_image(image_rel: &str) -> QuestionGroup {
        let row: QuestionRecord = serde_json::from_value(serde_json::json!({
            "question_id": "english_1_1_r1",
            "question": "q",
            "question_type": "open-ended",
            "language": "english",
            "main_question_id": 1,
            "sub_question_id": 1,
            "image_1": image_rel,
        }))
        .unwrap();
        QuestionGroup {
            language: "english".to_string(),
            main_question_id: 1,
            rows: vec![row],
        }
    }

    #[test]
    fn test_vision_encodes_data_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img.jpg"), b"fakejpeg").unwrap();

        let group = group_with_image("img.jpg");
        let images = collect_group_images(
            &group,
            dir.path().to_str().unwrap(),
            BackendCapability::Vision,
        )
        .unwrap();

        assert_eq!(images.len(), 1);
        assert!(images[0].starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_text_backend_reads_ocr_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img.jpg"), b"fakejpeg").unwrap();
        std::fs::write(dir.path().join("img.jpg.txt"), "表格文字内容\n").unwrap();

        let group = group_with_image("img.jpg");
        let images = collect_group_images(
            &group,
            dir.path().to_str().unwrap(),
            BackendCapability::Text,
        )
        .unwrap();

        assert_eq!(images, vec!["表格文字内容".to_string()]);
    }

    #[test]
    fn test_missing_image_is_group_error() {
        let dir = tempfile::tempdir().unwrap();
        let group = group_with_image("missing.jpg");
        let result = collect_group_images(
            &group,
            dir.path().to_str().unwrap(),
            BackendCapability::Vision,
        );
        assert!(result.is_err());
    }
}
