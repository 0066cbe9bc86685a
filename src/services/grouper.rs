//! 问题分组 - 业务能力层
//!
//! ## 职责
//!
//! 把整个数据集切成有序的问题组（同一主题的所有子题为一组），
//! 并在任何后端调用之前校验题号结构。
//!
//! ## 排序策略
//!
//! 语言优先级（声明的全序）→ 主题号升序 → 子题号升序。
//! 这个顺序是有实际含义的：组的上下文和图片只取"第一个"子题，
//! 组内排序错了会静默丢上下文。

use std::collections::BTreeMap;

use crate::error::DataError;
use crate::models::group::QuestionGroup;
use crate::models::language::language_order;
use crate::models::record::QuestionRecord;

/// 按 (语言, 主题号) 分组，返回有序的问题组列表
///
/// 校验失败（语言未知、题号不连续）直接返回错误，属于致命配置错误。
pub fn group_by_language_and_main_id(
    mut rows: Vec<QuestionRecord>,
) -> Result<Vec<QuestionGroup>, DataError> {
    // 语言必须在声明的全序内
    for row in &rows {
        if language_order(&row.language).is_none() {
            return Err(DataError::UnknownLanguage {
                language: row.language.clone(),
            });
        }
    }

    // 稳定多键排序：语言优先级 → 主题号 → 子题号
    rows.sort_by_key(|r| {
        (
            language_order(&r.language).unwrap_or(u32::MAX),
            r.main_question_id,
            r.sub_question_id,
        )
    });

    // 按 (语言, 主题号) 切组；排序后相同键必然相邻
    let mut groups: Vec<QuestionGroup> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(group)
                if group.language == row.language
                    && group.main_question_id == row.main_question_id =>
            {
                group.rows.push(row);
            }
            _ => groups.push(QuestionGroup {
                language: row.language.clone(),
                main_question_id: row.main_question_id,
                rows: vec![row],
            }),
        }
    }

    validate_groups(&groups)?;
    Ok(groups)
}

/// 校验题号结构
///
/// - 同一 (release, 语言) 分区内主题号从 1 开始连续
/// - 同一主题内子题号从 1 开始连续
fn validate_groups(groups: &[QuestionGroup]) -> Result<(), DataError> {
    // (release, 语言) → 主题号集合
    let mut main_ids: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();

    for group in groups {
        let release = group
            .rows
            .first()
            .and_then(|r| r.release.clone())
            .unwrap_or_default();
        main_ids
            .entry((release, group.language.clone()))
            .or_default()
            .push(group.main_question_id);

        for (idx, row) in group.rows.iter().enumerate() {
            let expected = idx as u32 + 1;
            if row.sub_question_id != expected {
                return Err(DataError::SubIdNotContiguous {
                    language: group.language.clone(),
                    main_question_id: group.main_question_id,
                    expected,
                    found: row.sub_question_id,
                });
            }
        }
    }

    for ((release, language), mut ids) in main_ids {
        ids.sort_unstable();
        ids.dedup();
        for (idx, id) in ids.iter().enumerate() {
            let expected = idx as u32 + 1;
            if *id != expected {
                return Err(DataError::MainIdNotContiguous {
                    release,
                    language,
                    expected,
                    found: *id,
                });
            }
        }
    }

    Ok(())
}
