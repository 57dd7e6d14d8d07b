// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理引擎封装

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array, IxDyn};
use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    GraphOptimizationLevel, Session, TensorRTExecutionProvider, ValueType,
};
use regex::Regex;
use tracing::{debug, info};

/// 推理后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrtEP {
    #[default]
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl OrtEP {
    pub fn from_flags(cuda: bool, trt: bool, device_id: i32) -> Self {
        if trt {
            OrtEP::Trt(device_id)
        } else if cuda {
            OrtEP::CUDA(device_id)
        } else {
            OrtEP::CPU
        }
    }

    fn dispatch(&self, trt_fp16: bool) -> Vec<ExecutionProviderDispatch> {
        match *self {
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
            // CUDA 不可用时 ort 自动回退 CPU
            OrtEP::CUDA(id) => vec![
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
            OrtEP::Trt(id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .with_fp16(trt_fp16)
                    .with_engine_cache(true)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
        }
    }
}

/// 引擎构建参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    /// 动态输入时使用的 (height, width)
    pub image_size: (u32, u32),
    /// 为 false 时要求模型携带 Ultralytics 导出元数据 (task=detect, names)
    pub trusted: bool,
}

impl Default for OrtConfig {
    fn default() -> Self {
        Self {
            f: PathBuf::from("weights/yolov8n.onnx"),
            ep: OrtEP::CPU,
            trt_fp16: false,
            image_size: (640, 640),
            trusted: true,
        }
    }
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    input_name: String,
    output_names: Vec<String>,
    batch: u32,
    height: u32,
    width: u32,
    nc: Option<u32>,
    task: Option<String>,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        if !args.f.exists() {
            bail!("model file not found: {}", args.f.display());
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(args.ep.dispatch(args.trt_fp16))?
            .commit_from_file(&args.f)
            .with_context(|| format!("failed to load ONNX model {}", args.f.display()))?;

        // input: [batch, 3, height, width], -1 表示动态维度
        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("model has no inputs"))?;
        let dims = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            other => bail!("unsupported input type: {:?}", other),
        };
        if dims.len() != 4 {
            bail!("expected NCHW input, got shape {:?}", dims);
        }
        let fixed = |d: i64, default: u32| if d > 0 { d as u32 } else { default };
        let batch = fixed(dims[0], 1);
        let height = fixed(dims[2], args.image_size.0);
        let width = fixed(dims[3], args.image_size.1);
        let input_name = input.name.clone();

        // output0: [batch, 4 + nc, anchors]
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let nc = session.outputs.first().and_then(|o| match &o.output_type {
            ValueType::Tensor { dimensions, .. } if dimensions.len() == 3 && dimensions[1] > 4 => {
                Some(dimensions[1] as u32 - 4)
            }
            _ => None,
        });

        let metadata = session.metadata()?;
        let task = metadata.custom("task")?;
        let names = metadata.custom("names")?.map(|s| parse_names(&s));

        // 严格模式: 只接受 Ultralytics 导出的检测模型
        if !args.trusted {
            match task.as_deref() {
                Some("detect") => {}
                Some(t) => bail!("model task `{}` is not `detect`", t),
                None => bail!(
                    "model {} carries no export metadata; load it with `trusted` to skip this check",
                    args.f.display()
                ),
            }
            if names.as_ref().map_or(true, |n| n.is_empty()) {
                bail!("model {} carries no class names", args.f.display());
            }
        }

        debug!(
            "ort session ready: input={} {:?}, outputs={:?}",
            input_name, dims, output_names
        );

        drop(metadata);
        Ok(Self {
            session,
            ep: args.ep,
            input_name,
            output_names,
            batch,
            height,
            width,
            nc,
            task,
            names,
        })
    }

    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let mut ys = Vec::with_capacity(self.output_names.len());
        for name in self.output_names.iter() {
            let y = outputs[name.as_str()].try_extract_tensor::<f32>()?;
            ys.push(y.into_owned());
        }
        debug!("[ORT run]: {:?}", t.elapsed());
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn batch(&self) -> u32 {
        self.batch
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// 类别数: 优先元数据, 其次输出形状
    pub fn nc(&self) -> Option<u32> {
        match &self.names {
            Some(names) if !names.is_empty() => Some(names.len() as u32),
            _ => self.nc,
        }
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn summary(&self) {
        info!(
            "ONNX model: task={}, ep={:?}, input={}x{}x{}, classes={}",
            self.task().unwrap_or("unknown"),
            self.ep,
            self.batch,
            self.height,
            self.width,
            self.nc().map_or_else(|| "?".to_string(), |n| n.to_string()),
        );
    }
}

/// 解析元数据中的类别表: `{0: 'person', 1: 'bicycle', ...}`
pub fn parse_names(s: &str) -> Vec<String> {
    let re = match Regex::new(r#"(['"])([-()\w '"]+)(['"])"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(s)
        .map(|caps| {
            let (_, [_, name, _]) = caps.extract();
            name.to_string()
        })
        .collect()
}
