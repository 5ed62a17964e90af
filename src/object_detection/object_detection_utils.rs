use crate::annotations::detection::{CoordinateSpace, Detection};
use crate::error::{DetectError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads a file with the class names into a vector so that the number ids
/// which come directly from the ORT inference session can be given meaning.
///
/// One name per line; surrounding whitespace is trimmed and blank lines are skipped.
pub fn read_classes_txt_file(filepath: &Path) -> Result<Vec<String>> {
    let file = File::open(filepath).map_err(|e| DetectError::io(filepath, e))?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| DetectError::io(filepath, e))?;
        let name = line.trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Non maxmimum suppression is a way of removing duplicate detections.
///
/// Candidates are visited from highest to lowest confidence (a stable sort, so equal
/// confidences keep their input order). Each surviving candidate removes every later candidate
/// of the same class whose IoU with it is at least `iou_threshold`. Boxes that do not overlap
/// never suppress each other, even at a threshold of 0. Detections of different classes never
/// suppress each other. The result is ordered by descending confidence.
pub fn non_maximum_suppression<S: CoordinateSpace>(
    mut detections: Vec<Detection<S>>,
    iou_threshold: f32,
) -> Vec<Detection<S>> {
    detections.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    let mut detections_to_remove: Vec<bool> = vec![false; detections.len()];
    for (current_index, current_det) in detections.iter().enumerate() {
        if detections_to_remove[current_index] {
            continue;
        }
        for (other_index, other_det) in detections[current_index + 1..].iter().enumerate() {
            let other_index = current_index + other_index + 1;
            if detections_to_remove[other_index] {
                continue;
            }
            if current_det.class_id() != other_det.class_id() {
                continue;
            }
            let iou = current_det.rect().intersection_over_union(other_det.rect());
            if iou > 0.0 && iou >= iou_threshold {
                detections_to_remove[other_index] = true;
            }
        }
    }
    let mut drop_iter = detections_to_remove.into_iter();
    detections.retain(|_| !drop_iter.next().unwrap_or(false));
    detections
}
