//! 语言优先级表
//!
//! 分组排序时语言是第一排序键，这里声明语言集合上的全序。
//! 数据集中未声明的语言在校验阶段直接报错，而不是默默排到最后。

use phf::phf_map;

/// 语言 → 排序优先级
static LANGUAGE_ORDER: phf::Map<&'static str, u32> = phf_map! {
    "english" => 0,
    "chinese" => 1,
    "french" => 2,
};

/// 查询语言的排序优先级（大小写不敏感）
pub fn language_order(language: &str) -> Option<u32> {
    LANGUAGE_ORDER.get(language.to_lowercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_languages() {
        assert_eq!(language_order("english"), Some(0));
        assert_eq!(language_order("Chinese"), Some(1));
        assert_eq!(language_order("FRENCH"), Some(2));
    }

    #[test]
    fn test_unknown_language() {
        assert_eq!(language_order("german"), None);
    }
}
