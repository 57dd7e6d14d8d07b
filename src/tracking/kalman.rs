//! 简化卡尔曼滤波器 (单个边界框, 对角协方差)

use crate::Bbox;

/// 匀速运动模型
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    // 状态估计: [cx, cy, w, h, vx, vy, vw, vh]
    state: [f32; 8],
    // 估计误差协方差 (简化为对角阵)
    p: [f32; 8],
    // 过程噪声
    q: f32,
    // 观测噪声
    r: f32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &Bbox) -> Self {
        let (cx, cy) = bbox.cxcy();
        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q: 0.1,
            r: 1.0,
        }
    }

    pub fn predict(&mut self) {
        self.state[0] += self.state[4];
        self.state[1] += self.state[5];
        self.state[2] += self.state[6];
        self.state[3] += self.state[7];

        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    pub fn update(&mut self, bbox: &Bbox) {
        let (cx, cy) = bbox.cxcy();

        // 卡尔曼增益 (速度增益降低)
        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let r = if i < 4 { self.r } else { self.r * 5.0 };
            k[i] = self.p[i] / (self.p[i] + r);
        }

        // 观测残差
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
            self.state[i + 4] += k[i + 4] * y[i];
        }

        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }
    }

    /// 当前状态对应的边界框
    pub fn bbox(&self) -> Bbox {
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        Bbox::from_cxcywh(self.state[0], self.state[1], w, h)
    }
}
