use crate::utils::error::DetectError;
use crate::Result;
use std::fs;
use std::path::Path;

/// COCO 80类，YOLOv5预训练模型的默认类别
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// 类别ID到名称的映射，随模型加载一次后不再变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(DetectError::ModelLoad("Class name list is empty".to_string()));
        }
        Ok(Self { names })
    }

    pub fn coco() -> Self {
        Self {
            names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 从文本文件加载，每行一个类别，忽略空行
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DetectError::ModelLoad(format!("Failed to read labels {}: {}", path.display(), e))
        })?;

        let names = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self::new(names)
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_has_eighty_classes() {
        let names = ClassNames::coco();
        assert_eq!(names.len(), 80);
        assert_eq!(names.get(0), Some("person"));
        assert_eq!(names.get(79), Some("toothbrush"));
        assert_eq!(names.get(80), None);
    }

    #[test]
    fn loads_labels_file_skipping_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cat\n\n  dog  \nbird").unwrap();

        let names = ClassNames::from_file(file.path()).unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.get(1), Some("dog"));
    }

    #[test]
    fn empty_labels_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            ClassNames::from_file(file.path()),
            Err(DetectError::ModelLoad(_))
        ));
    }
}
