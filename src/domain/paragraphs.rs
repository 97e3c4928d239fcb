//! 段落分割器
//!
//! 将整段故事正文按空行切分为段落，并均匀分配到若干场景

/// 检查是否为空行（只含空白字符）
#[inline]
fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// 按空行边界切分段落
///
/// 分割策略：
/// 1. 按行分割（支持 \n 和 \r\n）
/// 2. 连续的非空行属于同一段落，以 \n 重新连接
/// 3. 一个或多个空行作为段落边界
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_blank(line) {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line.trim());
    }

    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// 每个场景分配的段落数（向上取整）
pub fn paragraphs_per_scene(paragraph_count: usize, scene_count: usize) -> usize {
    let scene_count = scene_count.max(1);
    paragraph_count.div_ceil(scene_count)
}

/// 将段落按顺序分桶，每桶以空行重新连接
///
/// 每桶段落数为 `ceil(段落数 / 场景数)`，因此桶数可能少于场景数，
/// 但永远不会多于场景数。
pub fn bucket_paragraphs(paragraphs: &[String], scene_count: usize) -> Vec<String> {
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let per_scene = paragraphs_per_scene(paragraphs.len(), scene_count);
    paragraphs
        .chunks(per_scene)
        .map(|chunk| chunk.join("\n\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_blank_lines() {
        let text = "First line.\nStill first.\n\nSecond.\r\n  \r\nThird.";
        let paragraphs = split_paragraphs(text);

        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "First line.\nStill first.");
        assert_eq!(paragraphs[1], "Second.");
        assert_eq!(paragraphs[2], "Third.");
    }

    #[test]
    fn test_blank_input_has_no_paragraphs() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("\n \n\t\n").is_empty());
    }

    #[test]
    fn test_ceiling_distribution() {
        assert_eq!(paragraphs_per_scene(7, 3), 3);
        assert_eq!(paragraphs_per_scene(6, 3), 2);
        assert_eq!(paragraphs_per_scene(2, 4), 1);
        assert_eq!(paragraphs_per_scene(5, 0), 5);
    }

    #[test]
    fn test_buckets_never_exceed_scene_count() {
        let paragraphs: Vec<String> = (1..=5).map(|i| format!("P{}", i)).collect();
        let buckets = bucket_paragraphs(&paragraphs, 4);

        // ceil(5 / 4) = 2 → 3 个桶
        assert_eq!(buckets, vec!["P1\n\nP2", "P3\n\nP4", "P5"]);
    }

    #[test]
    fn test_buckets_reconstruct_paragraphs_in_order() {
        let text = "Alpha.\n\nBeta.\n\nGamma.\n\nDelta.\n\nEpsilon.\n\nZeta.\n\nEta.";
        let paragraphs = split_paragraphs(text);

        for scene_count in 1..=8 {
            let buckets = bucket_paragraphs(&paragraphs, scene_count);
            assert!(buckets.len() <= scene_count);

            let rejoined: Vec<String> = buckets
                .iter()
                .flat_map(|b| split_paragraphs(b))
                .collect();
            assert_eq!(rejoined, paragraphs);
        }
    }
}
