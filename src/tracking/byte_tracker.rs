/// ByteTrack 多目标跟踪
///
/// 核心思想:
/// 1. 高低分检测框分开处理
/// 2. 高分框优先匹配 (IOU)
/// 3. 低分框救援丢失的轨迹
/// 4. 纯运动模型,无需外观特征
///
/// 新轨迹先处于待确认状态, 第二次匹配成功后才输出 (首帧除外)
use tracing::trace;

use super::{KalmanBoxFilter, Tracker, TrackerKind, TrackerParams};
use crate::Bbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Tracked,
    Lost,
}

/// 单条轨迹
#[derive(Clone, Debug)]
struct STrack {
    id: u32,
    kalman: KalmanBoxFilter,
    /// 最近一次匹配的检测 (类别/置信度)
    last_det: Bbox,
    state: TrackState,
    activated: bool,
    frames_lost: u32,
}

impl STrack {
    fn new(id: u32, det: &Bbox, activated: bool) -> Self {
        Self {
            id,
            kalman: KalmanBoxFilter::new(det),
            last_det: det.clone(),
            state: TrackState::Tracked,
            activated,
            frames_lost: 0,
        }
    }

    fn update(&mut self, det: &Bbox) {
        self.kalman.update(det);
        self.last_det = det.clone();
        self.state = TrackState::Tracked;
        self.activated = true;
        self.frames_lost = 0;
    }

    fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
        self.frames_lost += 1;
    }

    fn output(&self) -> Bbox {
        self.last_det
            .clone()
            .with_geometry(&self.kalman.bbox())
            .with_track_id(self.id)
    }
}

/// ByteTrack / BoT-SORT 追踪器
pub struct MultiObjectTracker {
    kind: TrackerKind,
    params: TrackerParams,
    tracks: Vec<STrack>,
    next_id: u32,
    frame_id: u64,
}

impl MultiObjectTracker {
    pub fn new(kind: TrackerKind) -> Self {
        Self::with_params(kind, kind.params())
    }

    pub fn with_params(kind: TrackerKind, params: TrackerParams) -> Self {
        Self {
            kind,
            params,
            tracks: Vec::new(),
            next_id: 1,
            frame_id: 0,
        }
    }

    pub fn kind(&self) -> TrackerKind {
        self.kind
    }

    /// 贪心 IOU 匹配, 返回 (检测下标, 轨迹下标)
    fn associate(
        &self,
        detections: &[Bbox],
        det_indices: &[usize],
        track_indices: &[usize],
        max_cost: f32,
        first_stage: bool,
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for &det_idx in det_indices {
            let det = &detections[det_idx];
            for &track_idx in track_indices {
                let iou = det.iou(&self.tracks[track_idx].kalman.bbox());
                if iou <= 0.0 {
                    continue;
                }
                if first_stage {
                    if let Some(proximity) = self.params.proximity_thresh {
                        if 1.0 - iou > proximity {
                            continue;
                        }
                    }
                }
                let similarity = if self.params.fuse_score {
                    iou * det.confidence()
                } else {
                    iou
                };
                let cost = 1.0 - similarity;
                if cost <= max_cost {
                    candidates.push((cost, det_idx, track_idx));
                }
            }
        }

        // 贪心匹配: 按代价排序
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; self.tracks.len()];
        for (_, det_idx, track_idx) in candidates {
            if !used_det[det_idx] && !used_track[track_idx] {
                assignments.push((det_idx, track_idx));
                used_det[det_idx] = true;
                used_track[track_idx] = true;
            }
        }
        assignments
    }
}

impl Tracker for MultiObjectTracker {
    fn update(&mut self, detections: &[Bbox]) -> Vec<Bbox> {
        self.frame_id += 1;

        // 1. 所有轨迹先预测
        for track in self.tracks.iter_mut() {
            track.kalman.predict();
        }

        // 2. 分离高低分检测框
        let mut high_dets = Vec::new();
        let mut low_dets = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence() >= self.params.track_high_thresh {
                high_dets.push(idx);
            } else if det.confidence() > self.params.track_low_thresh {
                low_dets.push(idx);
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        // 3. 第一轮匹配: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        let assignments = self.associate(
            detections,
            &high_dets,
            &all_tracks,
            self.params.match_thresh,
            true,
        );
        for (det_idx, track_idx) in assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx]);
        }

        // 4. 第二轮匹配: 低分检测 + 未匹配的已确认轨迹
        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !matched_track[i] && self.tracks[i].activated)
            .collect();
        let low_assignments = self.associate(
            detections,
            &low_dets,
            &unmatched,
            self.params.low_match_thresh,
            false,
        );
        for (det_idx, track_idx) in low_assignments {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx]);
        }

        // 5. 未匹配的轨迹: 待确认的直接删除, 已确认的标记丢失
        let max_lost = self.params.track_buffer;
        let mut kept = Vec::with_capacity(self.tracks.len());
        let mut outputs = Vec::new();
        for (track_idx, mut track) in std::mem::take(&mut self.tracks).into_iter().enumerate() {
            if matched_track[track_idx] {
                outputs.push(track.output());
                kept.push(track);
            } else if track.activated {
                track.mark_lost();
                if track.frames_lost <= max_lost {
                    kept.push(track);
                }
            }
        }
        self.tracks = kept;

        // 6. 未匹配的高分检测 → 新建轨迹 (首帧直接确认)
        let first_frame = self.frame_id == 1;
        for (det_idx, det) in detections.iter().enumerate() {
            if matched_det[det_idx] || det.confidence() < self.params.new_track_thresh {
                continue;
            }
            let track = STrack::new(self.next_id, det, first_frame);
            self.next_id += 1;
            if first_frame {
                outputs.push(track.output());
            }
            self.tracks.push(track);
        }

        trace!(
            "frame {}: {} detections, {} tracks, {} outputs",
            self.frame_id,
            detections.len(),
            self.tracks.len(),
            outputs.len()
        );
        outputs
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame_id = 0;
    }

    fn track_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.state == TrackState::Tracked && t.activated)
            .count()
    }
}
