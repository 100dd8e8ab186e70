#![cfg(feature = "backend-tract")]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::capture::VideoFrame;
use crate::estimate::backend::{EstimatorHandle, InputParams, MultiParams, PoseEstimator};
use crate::estimate::decode::{
    decode_multiple_poses, decode_single_pose, rescale_pose, PoseNetOutputs,
};
use crate::pose::Pose;
use crate::store::Architecture;

type Plan = TypedRunnableModel<TypedModel>;

struct LoadedModel {
    model: InferenceModel,
    plans: HashMap<(usize, usize), Plan>,
}

/// Tract-based PoseNet estimator.
///
/// Loads `posenet_mobilenet_<tag>.onnx` from a local directory. The model takes
/// an NHWC f32 image in [-1, 1] and yields heatmaps, offsets, forward and
/// backward displacements, in that order. Optimized plans are cached per input
/// size because the input resolution depends on the scale factor and stride.
pub struct TractEstimator {
    model_dir: PathBuf,
    loaded: HashMap<u64, LoadedModel>,
    next_id: u64,
}

impl TractEstimator {
    pub fn new<P: AsRef<Path>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            loaded: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn model_path(&self, architecture: Architecture) -> PathBuf {
        self.model_dir
            .join(format!("posenet_mobilenet_{}.onnx", architecture.tag()))
    }

    fn infer(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
    ) -> Result<(PoseNetOutputs, usize, usize)> {
        let loaded = self
            .loaded
            .get_mut(&handle.id())
            .ok_or_else(|| anyhow!("estimator handle {} is not loaded", handle.id()))?;

        let stride = input.output_stride.as_u32() as usize;
        let in_w = valid_resolution(frame.width(), input.image_scale_factor, stride);
        let in_h = valid_resolution(frame.height(), input.image_scale_factor, stride);

        if !loaded.plans.contains_key(&(in_w, in_h)) {
            let plan = loaded
                .model
                .clone()
                .with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, in_h, in_w, 3)),
                )
                .context("failed to set input fact")?
                .into_optimized()
                .context("failed to optimize ONNX model")?
                .into_runnable()
                .context("failed to build runnable ONNX model")?;
            log::debug!("TractEstimator: built plan for {}x{}", in_w, in_h);
            loaded.plans.insert((in_w, in_h), plan);
        }
        let plan = loaded
            .plans
            .get(&(in_w, in_h))
            .ok_or_else(|| anyhow!("plan cache miss for {}x{}", in_w, in_h))?;

        let resized = imageops::resize(
            &frame.image,
            in_w as u32,
            in_h as u32,
            FilterType::Triangle,
        );
        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, in_h, in_w, 3),
            |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 127.5 - 1.0,
        )
        .into();

        let outputs = plan
            .run(tvec!(tensor.into()))
            .context("PoseNet inference failed")?;
        if outputs.len() < 4 {
            return Err(anyhow!("PoseNet model produced {} outputs, expected 4", outputs.len()));
        }

        let (grid_h, grid_w) = grid_shape(&outputs[0])?;
        let flatten = |index: usize| -> Result<Vec<f32>> {
            let view = outputs[index]
                .to_array_view::<f32>()
                .with_context(|| format!("output {} was not f32", index))?;
            Ok(view.iter().copied().collect())
        };
        let heatmaps = flatten(0)?
            .into_iter()
            .map(|v| 1.0 / (1.0 + (-v).exp()))
            .collect();
        let decoded = PoseNetOutputs::new(
            grid_h,
            grid_w,
            stride as u32,
            heatmaps,
            flatten(1)?,
            flatten(2)?,
            flatten(3)?,
        )?;
        Ok((decoded, in_w, in_h))
    }
}

/// Largest size not above `dim * scale` that is a multiple of `stride`, plus one.
pub fn valid_resolution(dim: u32, scale: f32, stride: usize) -> usize {
    let scaled = (dim as f32 * scale - 1.0).max(0.0) as usize;
    (scaled / stride) * stride + 1
}

fn grid_shape(output: &TValue) -> Result<(usize, usize)> {
    match output.shape() {
        [1, h, w, _] => Ok((*h, *w)),
        other => Err(anyhow!("unexpected heatmap shape {:?}", other)),
    }
}

fn to_frame(pose: &Pose, frame: &VideoFrame, in_w: usize, in_h: usize, flip: bool) -> Pose {
    let scale_x = frame.width() as f32 / in_w as f32;
    let scale_y = frame.height() as f32 / in_h as f32;
    let mirror = flip.then(|| frame.width() as f32);
    rescale_pose(pose, scale_x, scale_y, mirror)
}

impl PoseEstimator for TractEstimator {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self, architecture: Architecture) -> Result<EstimatorHandle> {
        let path = self.model_path(architecture);
        if !path.exists() {
            return Err(anyhow!("model file {} not found", path.display()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?;

        let id = self.next_id;
        self.next_id += 1;
        self.loaded.insert(
            id,
            LoadedModel {
                model,
                plans: HashMap::new(),
            },
        );
        log::info!("TractEstimator: loaded {}", path.display());
        Ok(EstimatorHandle::new(id, architecture))
    }

    fn dispose(&mut self, handle: EstimatorHandle) -> Result<()> {
        self.loaded
            .remove(&handle.id())
            .map(|_| ())
            .ok_or_else(|| anyhow!("estimator handle {} is not loaded", handle.id()))
    }

    fn estimate_single(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
    ) -> Result<Pose> {
        let (outputs, in_w, in_h) = self.infer(handle, frame, input)?;
        let pose = decode_single_pose(&outputs);
        Ok(to_frame(&pose, frame, in_w, in_h, input.flip_horizontal))
    }

    fn estimate_multiple(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
        multi: &MultiParams,
    ) -> Result<Vec<Pose>> {
        let (outputs, in_w, in_h) = self.infer(handle, frame, input)?;
        Ok(decode_multiple_poses(
            &outputs,
            multi.max_detections,
            multi.min_part_confidence,
            multi.nms_radius,
        )
        .iter()
        .map(|pose| to_frame(pose, frame, in_w, in_h, input.flip_horizontal))
        .collect())
    }
}
