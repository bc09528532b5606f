//! 候选答案的生成与编码
//!
//! - 单选 n 项：n 个候选
//! - 多选 n 项：2ⁿ−1 个非空子集，先按大小再按字典序
//! - 连线：每个条目各选一项的全部组合
//! - 填空：一个占位候选

use crate::error::BusinessError;
use crate::models::{CandidateChoice, QuestionKind};

/// 候选答案数量上限
pub const MAX_CANDIDATES: u128 = 65_536;

/// 单选和填空提交时使用的字段名
const VARIANT_FIELD: &str = "variant";

/// 候选答案空间的大小
pub fn candidate_space_size(kind: &QuestionKind) -> u128 {
    match kind {
        QuestionKind::Single(options) => options.len() as u128,
        QuestionKind::Multiple(options) => 1u128
            .checked_shl(options.len() as u32)
            .map_or(u128::MAX, |total| total - 1),
        QuestionKind::Correlation(items) if items.is_empty() => 0,
        QuestionKind::Correlation(items) => items
            .iter()
            .fold(1u128, |total, item| total.saturating_mul(item.options.len() as u128)),
        QuestionKind::FreeForm => 1,
    }
}

/// 生成完整的候选答案空间
pub fn generate(task_id: i64, kind: &QuestionKind) -> Result<Vec<CandidateChoice>, BusinessError> {
    let size = candidate_space_size(kind);
    if size == 0 {
        return Err(BusinessError::EmptyCandidateSpace { task_id });
    }
    if size > MAX_CANDIDATES {
        return Err(BusinessError::CandidateSpaceTooLarge { task_id, size });
    }

    let choices = match kind {
        QuestionKind::Single(options) => options
            .iter()
            .map(|option| CandidateChoice::Options(vec![option.number]))
            .collect(),
        QuestionKind::Multiple(options) => {
            let numbers: Vec<u32> = options.iter().map(|option| option.number).collect();
            (1..=numbers.len())
                .flat_map(|size| combinations(&numbers, size))
                .map(CandidateChoice::Options)
                .collect()
        }
        QuestionKind::Correlation(items) => {
            let columns: Vec<Vec<u32>> = items
                .iter()
                .map(|item| item.options.iter().map(|option| option.number).collect())
                .collect();
            cartesian_product(&columns)
                .into_iter()
                .map(CandidateChoice::Assignment)
                .collect()
        }
        QuestionKind::FreeForm => vec![CandidateChoice::Text(String::new())],
    };
    Ok(choices)
}

/// 把候选答案编码为表单字段
pub fn encode(
    task_id: i64,
    kind: &QuestionKind,
    choice: &CandidateChoice,
) -> Result<Vec<(String, String)>, BusinessError> {
    let mismatch = || BusinessError::CandidateMismatch { task_id };

    match (kind, choice) {
        (QuestionKind::Single(options), CandidateChoice::Options(numbers)) => match numbers[..] {
            [number] if options.iter().any(|option| option.number == number) => {
                Ok(vec![(VARIANT_FIELD.to_string(), number.to_string())])
            }
            _ => Err(mismatch()),
        },
        (QuestionKind::Multiple(options), CandidateChoice::Options(numbers)) => numbers
            .iter()
            .map(|number| {
                options
                    .iter()
                    .find(|option| option.number == *number)
                    .map(|option| (option.field.clone(), number.to_string()))
                    .ok_or_else(mismatch)
            })
            .collect(),
        (QuestionKind::Correlation(items), CandidateChoice::Assignment(numbers))
            if items.len() == numbers.len() =>
        {
            items
                .iter()
                .zip(numbers)
                .map(|(item, number)| {
                    item.options
                        .iter()
                        .any(|option| option.number == *number)
                        .then(|| (item.field.clone(), number.to_string()))
                        .ok_or_else(mismatch)
                })
                .collect()
        }
        (QuestionKind::FreeForm, CandidateChoice::Text(text)) => {
            Ok(vec![(VARIANT_FIELD.to_string(), text.clone())])
        }
        _ => Err(mismatch()),
    }
}

/// 候选答案是否构成答案空间的划分（排除法只对这类题有效）
pub fn supports_elimination(kind: &QuestionKind, eliminate_multiple_choice: bool) -> bool {
    match kind {
        QuestionKind::Single(_) => true,
        QuestionKind::Multiple(_) => eliminate_multiple_choice,
        QuestionKind::Correlation(_) | QuestionKind::FreeForm => false,
    }
}

/// 按字典序枚举 `items` 中大小为 `k` 的组合
fn combinations(items: &[u32], k: usize) -> Vec<Vec<u32>> {
    let n = items.len();
    if k == 0 || k > n {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.iter().map(|&i| items[i]).collect());

        // 找到最右边还能右移的位置
        let Some(pos) = (0..k).rev().find(|&i| indices[i] != i + n - k) else {
            return result;
        };
        indices[pos] += 1;
        for i in pos + 1..k {
            indices[i] = indices[i - 1] + 1;
        }
    }
}

fn cartesian_product(columns: &[Vec<u32>]) -> Vec<Vec<u32>> {
    columns.iter().fold(vec![Vec::new()], |rows, column| {
        rows.iter()
            .flat_map(|row| {
                column.iter().map(move |value| {
                    let mut next = row.clone();
                    next.push(*value);
                    next
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrelationItem, OptionDescriptor};

    fn options(count: u32) -> Vec<OptionDescriptor> {
        (1..=count)
            .map(|number| OptionDescriptor {
                number,
                field: format!("variant_{}", number),
                text: format!("option {}", number),
            })
            .collect()
    }

    fn item(field: &str, count: u32) -> CorrelationItem {
        CorrelationItem {
            field: field.to_string(),
            text: field.to_string(),
            options: options(count),
        }
    }

    #[test]
    fn test_multiple_choice_subsets_in_order() {
        let choices = generate(1, &QuestionKind::Multiple(options(3))).unwrap();
        let expected: Vec<CandidateChoice> = [
            vec![1],
            vec![2],
            vec![3],
            vec![1, 2],
            vec![1, 3],
            vec![2, 3],
            vec![1, 2, 3],
        ]
        .into_iter()
        .map(CandidateChoice::Options)
        .collect();
        assert_eq!(choices, expected);
    }

    #[test]
    fn test_space_sizes_per_kind() {
        assert_eq!(generate(1, &QuestionKind::Single(options(4))).unwrap().len(), 4);
        assert_eq!(generate(1, &QuestionKind::Multiple(options(5))).unwrap().len(), 31);
        assert_eq!(
            generate(1, &QuestionKind::Correlation(vec![item("a", 2), item("b", 3)]))
                .unwrap()
                .len(),
            6
        );
        assert_eq!(
            generate(1, &QuestionKind::FreeForm).unwrap(),
            vec![CandidateChoice::Text(String::new())]
        );
    }

    #[test]
    fn test_correlation_assignments_are_distinct_and_complete() {
        let items = vec![item("a", 2), item("b", 3), item("c", 2)];
        let choices = generate(1, &QuestionKind::Correlation(items)).unwrap();

        let assignments: std::collections::HashSet<Vec<u32>> = choices
            .iter()
            .map(|choice| match choice {
                CandidateChoice::Assignment(numbers) => numbers.clone(),
                other => panic!("连线题应生成完整的匹配，实际为 {:?}", other),
            })
            .collect();

        assert_eq!(choices.len(), 12);
        assert_eq!(assignments.len(), choices.len());
        assert!(assignments.iter().all(|numbers| numbers.len() == 3));
    }

    #[test]
    fn test_oversized_space_is_rejected() {
        let err = generate(9, &QuestionKind::Multiple(options(20))).unwrap_err();
        assert!(matches!(
            err,
            BusinessError::CandidateSpaceTooLarge { task_id: 9, size } if size == (1 << 20) - 1
        ));

        let err = generate(9, &QuestionKind::Single(Vec::new())).unwrap_err();
        assert!(matches!(err, BusinessError::EmptyCandidateSpace { task_id: 9 }));
    }

    #[test]
    fn test_encode_per_kind() {
        let single = QuestionKind::Single(options(3));
        assert_eq!(
            encode(1, &single, &CandidateChoice::Options(vec![2])).unwrap(),
            vec![("variant".to_string(), "2".to_string())]
        );

        let multiple = QuestionKind::Multiple(options(3));
        assert_eq!(
            encode(1, &multiple, &CandidateChoice::Options(vec![1, 3])).unwrap(),
            vec![
                ("variant_1".to_string(), "1".to_string()),
                ("variant_3".to_string(), "3".to_string())
            ]
        );

        let correlation = QuestionKind::Correlation(vec![item("left_a", 2), item("left_b", 2)]);
        assert_eq!(
            encode(1, &correlation, &CandidateChoice::Assignment(vec![2, 1])).unwrap(),
            vec![
                ("left_a".to_string(), "2".to_string()),
                ("left_b".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn test_encode_rejects_mismatched_choice() {
        let single = QuestionKind::Single(options(2));
        assert!(encode(5, &single, &CandidateChoice::Options(vec![1, 2])).is_err());
        assert!(encode(5, &single, &CandidateChoice::Text("x".to_string())).is_err());

        let correlation = QuestionKind::Correlation(vec![item("a", 2)]);
        assert!(encode(5, &correlation, &CandidateChoice::Assignment(vec![1, 1])).is_err());
    }

    #[test]
    fn test_elimination_only_for_partitions() {
        assert!(supports_elimination(&QuestionKind::Single(options(2)), false));
        assert!(!supports_elimination(&QuestionKind::Multiple(options(2)), false));
        assert!(supports_elimination(&QuestionKind::Multiple(options(2)), true));
        assert!(!supports_elimination(&QuestionKind::FreeForm, true));
    }
}
