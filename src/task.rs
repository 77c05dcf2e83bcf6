// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/task.rs - 逐视频扫描任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  collections::{BTreeSet, HashMap},
  path::{Path, PathBuf},
  time::Instant,
};

use chrono::{DateTime, Local};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::ScanConfig,
  frame::{FrameError, PreparedFrame, load_frame},
  input::{ClipExtractor, ClipSet, ExtractError, ExtractStatus, Workspace},
  model::{Detection, Model, Prior, RawDetections, decode, generate_priors, suppress},
  output::{FrameMatch, OutputDirectory, OutputError, Render},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("无法创建工作目录: {0}")]
  WorkspaceError(std::io::Error),
  #[error("片段提取失败: {0}")]
  ExtractError(#[from] ExtractError),
  #[error("无法列出片段: {0}")]
  ClipListError(std::io::Error),
  #[error("代表帧 {path} 读取失败: {source}")]
  FrameError { path: PathBuf, source: FrameError },
  #[error("推理失败: {0}")]
  ModelError(Box<dyn std::error::Error + Send + Sync>),
  #[error("检测器输出与先验框数量不一致: 先验框 {priors}, 输出 {actual}")]
  Misaligned { priors: usize, actual: usize },
  #[error("输出失败: {0}")]
  OutputError(#[from] OutputError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoStatus {
  NoMatch,
  Matched {
    /// 已保存的标注帧，关闭保存图像时为空
    frames: Vec<PathBuf>,
    /// 每个命中帧的检测记录
    records: Vec<PathBuf>,
    clips: Vec<PathBuf>,
  },
  Failed(String),
}

impl VideoStatus {
  fn label(&self) -> &'static str {
    match self {
      VideoStatus::NoMatch => "no_match",
      VideoStatus::Matched { .. } => "matched",
      VideoStatus::Failed(_) => "failed",
    }
  }
}

fn display_all(paths: &[PathBuf]) -> Vec<String> {
  paths.iter().map(|p| p.display().to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct VideoOutcome {
  pub video: PathBuf,
  /// 提取工具未能运行结束时为 `None`
  pub extraction: Option<ExtractStatus>,
  pub status: VideoStatus,
}

impl VideoOutcome {
  fn to_json(&self) -> serde_json::Value {
    let mut value = json!({
      "video": self.video.display().to_string(),
      "status": self.status.label(),
      "extract_code": self.extraction.and_then(|s| s.code()),
    });
    match &self.status {
      VideoStatus::Matched {
        frames,
        records,
        clips,
      } => {
        value["frames"] = json!(display_all(frames));
        value["records"] = json!(display_all(records));
        value["clips"] = json!(display_all(clips));
      }
      VideoStatus::Failed(reason) => value["reason"] = json!(reason),
      VideoStatus::NoMatch => {}
    }
    value
  }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
  pub started: DateTime<Local>,
  pub finished: DateTime<Local>,
  pub videos: Vec<VideoOutcome>,
}

impl ScanReport {
  pub fn count(&self, pred: impl Fn(&VideoStatus) -> bool) -> usize {
    self.videos.iter().filter(|v| pred(&v.status)).count()
  }

  pub fn matched(&self) -> usize {
    self.count(|s| matches!(s, VideoStatus::Matched { .. }))
  }

  pub fn failed(&self) -> usize {
    self.count(|s| matches!(s, VideoStatus::Failed(_)))
  }

  pub fn to_json(&self, config: &ScanConfig) -> serde_json::Value {
    json!({
      "started": self.started.to_rfc3339(),
      "finished": self.finished.to_rfc3339(),
      "network": config.network.to_string(),
      "vis_threshold": config.rule.vis_threshold,
      "total": self.videos.len(),
      "matched": self.matched(),
      "failed": self.failed(),
      "videos": self.videos.iter().map(VideoOutcome::to_json).collect::<Vec<_>>(),
    })
  }
}

/// 按视频依次执行：切分、逐片段检测、命中输出、清理工作目录
pub struct VideoScanTask<'a, X> {
  config: &'a ScanConfig,
  extractor: X,
  priors: HashMap<(u32, u32), Box<[Prior]>>,
}

fn video_stem(video: &Path) -> String {
  video
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

impl<'a, X: ClipExtractor> VideoScanTask<'a, X> {
  pub fn new(config: &'a ScanConfig, extractor: X) -> Self {
    Self {
      config,
      extractor,
      priors: HashMap::new(),
    }
  }

  fn priors_for(&mut self, width: u32, height: u32) -> &[Prior] {
    let cfg = self.config.network.config();
    self
      .priors
      .entry((width, height))
      .or_insert_with(|| generate_priors(cfg, height, width))
  }

  /// 单帧的检测与规则过滤，返回命中规则的检测结果
  fn detect<M>(&mut self, model: &M, prepared: &PreparedFrame) -> Result<Vec<Detection>, ScanError>
  where
    M: Model<Input = PreparedFrame, Output = RawDetections>,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let now = Instant::now();
    let raw = model
      .infer(prepared)
      .map_err(|e| ScanError::ModelError(Box::new(e)))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let config = self.config;
    let scale = prepared.decode_scale();
    let priors = self.priors_for(prepared.width(), prepared.height());
    if !raw.is_aligned_with(priors.len()) {
      return Err(ScanError::Misaligned {
        priors: priors.len(),
        actual: raw.len(),
      });
    }

    let variance = config.network.config().variance;
    let detections = suppress(decode(priors, &raw, variance, &scale), &config.suppress);
    Ok(
      detections
        .into_iter()
        .filter(|d| config.rule.matches(d))
        .collect(),
    )
  }

  fn scan_clips<M>(
    &mut self,
    video: &Path,
    workspace: &Path,
    model: &M,
    output: &OutputDirectory,
  ) -> Result<VideoStatus, ScanError>
  where
    M: Model<Input = PreparedFrame, Output = RawDetections>,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let clips = ClipSet::scan(workspace).map_err(ScanError::ClipListError)?;
    info!("[SCAN] {} 共 {} 个片段", video.display(), clips.len());

    let stem = video_stem(video);
    let mut frames = Vec::new();
    let mut records = Vec::new();
    let mut copied = BTreeSet::new();

    for (index, clip) in clips.iter().enumerate() {
      let frame_path = ClipSet::frame_path(clip);
      let image = load_frame(&frame_path).map_err(|source| ScanError::FrameError {
        path: frame_path.clone(),
        source,
      })?;
      let prepared = PreparedFrame::new(&image, &self.config.resize);
      let matched = self.detect(model, &prepared)?;
      if matched.is_empty() {
        continue;
      }

      info!(
        "[MATCH] {} 第 {} 个片段命中 {} 个目标",
        stem,
        index,
        matched.len()
      );
      output.render_result(
        &image,
        &FrameMatch {
          video_stem: &stem,
          frame_path: &frame_path,
          detections: &matched,
        },
      )?;
      records.push(output.record_output_path(&stem, &frame_path)?);
      if output.saves_images() {
        frames.push(output.frame_output_path(&stem, &frame_path)?);
      }
      copied.extend(output.copy_clips(&stem, &clips, index)?);
    }

    if records.is_empty() {
      Ok(VideoStatus::NoMatch)
    } else {
      Ok(VideoStatus::Matched {
        frames,
        records,
        clips: copied.into_iter().collect(),
      })
    }
  }

  fn scan_video<M>(
    &mut self,
    video: &Path,
    model: &M,
    output: &OutputDirectory,
  ) -> VideoOutcome
  where
    M: Model<Input = PreparedFrame, Output = RawDetections>,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut extraction = None;
    let result = Workspace::create_in(&self.config.scratch_root)
      .map_err(ScanError::WorkspaceError)
      .and_then(|workspace| {
        let status = self.extractor.extract(video, workspace.path())?;
        extraction = Some(status);
        self.scan_clips(video, workspace.path(), model, output)
      });

    let status = result.unwrap_or_else(|e| {
      error!("[SCAN] 视频 {} 处理失败: {}", video.display(), e);
      VideoStatus::Failed(e.to_string())
    });
    VideoOutcome {
      video: video.to_path_buf(),
      extraction,
      status,
    }
  }
}

impl<'a, 'm, 'o, X, M, I> Task<I, &'m M, &'o OutputDirectory> for VideoScanTask<'a, X>
where
  X: ClipExtractor,
  M: Model<Input = PreparedFrame, Output = RawDetections>,
  M::Error: std::error::Error + Send + Sync + 'static,
  I: IntoIterator<Item = PathBuf>,
{
  type Output = ScanReport;
  type Error = ScanError;

  fn run_task(
    mut self,
    input: I,
    model: &'m M,
    output: &'o OutputDirectory,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let started = Local::now();
    let mut videos = Vec::new();

    for video in input {
      let now = Instant::now();
      info!("[SCAN] 处理视频: {}", video.display());
      let outcome = self.scan_video(&video, model, output);
      match &outcome.status {
        VideoStatus::NoMatch => info!("[SCAN] 未命中，耗时 {:.2?}", now.elapsed()),
        VideoStatus::Matched { records, .. } => {
          info!("[SCAN] 命中 {} 帧，耗时 {:.2?}", records.len(), now.elapsed())
        }
        VideoStatus::Failed(_) => warn!("[SCAN] 跳过视频 {}", video.display()),
      }
      videos.push(outcome);
    }

    let report = ScanReport {
      started,
      finished: Local::now(),
      videos,
    };
    info!(
      "任务完成: 共 {} 个视频, 命中 {}, 失败 {}",
      report.videos.len(),
      report.matched(),
      report.failed()
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use image::{Rgb, RgbImage};

  use super::*;
  use crate::{
    config::CFG_RFB,
    frame::ResizePolicy,
    model::{CONF_WIDTH, LANDM_WIDTH, LOC_WIDTH},
  };

  const FRAME_SIZE: u32 = 32;

  #[derive(Debug, Clone, Copy)]
  enum Frame {
    /// 白色帧，假模型在此给出命中目标
    Hit,
    Blank,
    Corrupt,
  }

  struct FakeExtractor {
    frames: Vec<Frame>,
    status: ExtractStatus,
    seen: Mutex<Vec<PathBuf>>,
  }

  impl FakeExtractor {
    fn new(frames: &[Frame]) -> Self {
      Self {
        frames: frames.to_vec(),
        status: ExtractStatus::Success,
        seen: Mutex::new(Vec::new()),
      }
    }

    fn workspaces(&self) -> Vec<PathBuf> {
      self.seen.lock().unwrap().clone()
    }
  }

  impl ClipExtractor for &FakeExtractor {
    fn extract(&self, _video: &Path, workspace: &Path) -> Result<ExtractStatus, ExtractError> {
      self.seen.lock().unwrap().push(workspace.to_path_buf());
      for (i, frame) in self.frames.iter().enumerate() {
        std::fs::write(workspace.join(format!("v_{:04}.mp4", i)), format!("clip {}", i)).unwrap();
        let jpg = workspace.join(format!("v_{:04}_first.jpg", i));
        match frame {
          Frame::Hit => RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([255, 255, 255]))
            .save(&jpg)
            .unwrap(),
          Frame::Blank => RgbImage::new(FRAME_SIZE, FRAME_SIZE).save(&jpg).unwrap(),
          Frame::Corrupt => std::fs::write(&jpg, b"broken").unwrap(),
        }
      }
      Ok(self.status)
    }
  }

  /// 亮帧在第 0 个先验框处给出一个矮框且关键点跨度为 10 像素的人脸
  struct FakeModel {
    drop_landms: bool,
  }

  impl Model for FakeModel {
    type Input = PreparedFrame;
    type Output = RawDetections;
    type Error = std::io::Error;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      let n = generate_priors(&CFG_RFB, input.height(), input.width()).len();
      let mut conf = vec![0.0; n * CONF_WIDTH];
      let mut landms = vec![0.0; n * LANDM_WIDTH];
      if input.as_nchw()[0] > 0.0 {
        conf[1] = 0.99;
        // 第 1 个关键点的 x 偏移 10 * 0.1 * 10px
        landms[2] = 10.0;
      }
      if self.drop_landms {
        landms.truncate(LANDM_WIDTH);
      }
      Ok(RawDetections {
        loc: vec![0.0; n * LOC_WIDTH].into_boxed_slice(),
        conf: conf.into_boxed_slice(),
        landms: landms.into_boxed_slice(),
      })
    }
  }

  struct Fixture {
    scratch: tempfile::TempDir,
    out: tempfile::TempDir,
    config: ScanConfig,
  }

  fn fixture() -> Fixture {
    let scratch = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let config = ScanConfig {
      resize: ResizePolicy {
        long_side: 320,
        origin_size: true,
      },
      scratch_root: scratch.path().to_path_buf(),
      ..ScanConfig::default()
    };
    Fixture {
      scratch,
      out,
      config,
    }
  }

  fn run(fx: &Fixture, extractor: &FakeExtractor, model: &FakeModel) -> ScanReport {
    let output = OutputDirectory::create(fx.out.path(), fx.config.save_image).unwrap();
    VideoScanTask::new(&fx.config, extractor)
      .run_task(vec![PathBuf::from("/data/a_司机室.mp4")], model, &output)
      .unwrap()
  }

  fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    names
  }

  #[test]
  fn failing_frame_fails_video_and_cleans_workspace() {
    let fx = fixture();
    let extractor = FakeExtractor::new(&[Frame::Hit, Frame::Corrupt, Frame::Blank]);
    let report = run(&fx, &extractor, &FakeModel { drop_landms: false });

    let outcome = &report.videos[0];
    assert!(matches!(outcome.status, VideoStatus::Failed(_)));
    assert_eq!(outcome.extraction, Some(ExtractStatus::Success));

    let workspaces = extractor.workspaces();
    assert_eq!(workspaces.len(), 1);
    assert!(!workspaces[0].exists());
    assert_eq!(std::fs::read_dir(fx.scratch.path()).unwrap().count(), 0);

    // 失败之前的命中仍保留在输出目录中
    assert_eq!(
      listing(&fx.out.path().join("a_司机室")),
      ["v_0000.mp4", "v_0000_first.jpg", "v_0000_first.txt", "v_0001.mp4"]
    );
  }

  #[test]
  fn last_clip_match_copies_previous_neighbor() {
    let fx = fixture();
    let extractor = FakeExtractor::new(&[Frame::Blank, Frame::Blank, Frame::Hit]);
    let report = run(&fx, &extractor, &FakeModel { drop_landms: false });

    let VideoStatus::Matched { frames, clips, .. } = &report.videos[0].status else {
      panic!("unexpected status {:?}", report.videos[0].status);
    };
    assert_eq!(frames.len(), 1);
    let names: Vec<_> = clips
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["v_0001.mp4", "v_0002.mp4"]);

    let record =
      std::fs::read_to_string(fx.out.path().join("a_司机室/v_0002_first.txt")).unwrap();
    assert!(record.starts_with("0.9900, -1.0, -1.0, 9.0, 9.0, 4.0, 4.0, 14.0, 4.0"));
    assert!(!extractor.workspaces()[0].exists());
  }

  #[test]
  fn adjacent_matches_copy_each_clip_once() {
    let fx = fixture();
    let extractor = FakeExtractor::new(&[Frame::Hit, Frame::Hit, Frame::Blank, Frame::Blank]);
    let report = run(&fx, &extractor, &FakeModel { drop_landms: false });

    let VideoStatus::Matched { frames, clips, .. } = &report.videos[0].status else {
      panic!("unexpected status {:?}", report.videos[0].status);
    };
    assert_eq!(frames.len(), 2);
    assert_eq!(clips.len(), 3);
  }

  #[test]
  fn summary_lists_only_written_files_without_images() {
    let mut fx = fixture();
    fx.config.save_image = false;
    let extractor = FakeExtractor::new(&[Frame::Hit, Frame::Blank]);
    let report = run(&fx, &extractor, &FakeModel { drop_landms: false });

    let VideoStatus::Matched { frames, records, .. } = &report.videos[0].status else {
      panic!("unexpected status {:?}", report.videos[0].status);
    };
    assert!(frames.is_empty());
    assert_eq!(records, &[fx.out.path().join("a_司机室/v_0000_first.txt")]);
    assert!(!fx.out.path().join("a_司机室/v_0000_first.jpg").exists());

    let summary = report.to_json(&fx.config);
    let video = &summary["videos"][0];
    assert_eq!(video["frames"].as_array().unwrap().len(), 0);
    for key in ["records", "clips"] {
      for path in video[key].as_array().unwrap() {
        assert!(Path::new(path.as_str().unwrap()).is_file(), "{} 不存在", path);
      }
    }
  }

  #[test]
  fn failed_extraction_without_clips_is_no_match() {
    let fx = fixture();
    let mut extractor = FakeExtractor::new(&[]);
    extractor.status = ExtractStatus::Failed(Some(2));
    let report = run(&fx, &extractor, &FakeModel { drop_landms: false });

    let outcome = &report.videos[0];
    assert_eq!(outcome.status, VideoStatus::NoMatch);
    assert_eq!(outcome.extraction, Some(ExtractStatus::Failed(Some(2))));
    assert!(listing(fx.out.path()).is_empty());

    let summary = report.to_json(&fx.config);
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["matched"], 0);
    assert_eq!(summary["videos"][0]["extract_code"], 2);
    assert_eq!(summary["videos"][0]["status"], "no_match");
  }

  #[test]
  fn misaligned_detector_output_fails_video() {
    let fx = fixture();
    let extractor = FakeExtractor::new(&[Frame::Hit]);
    let report = run(&fx, &extractor, &FakeModel { drop_landms: true });

    let VideoStatus::Failed(reason) = &report.videos[0].status else {
      panic!("unexpected status {:?}", report.videos[0].status);
    };
    assert!(reason.contains("先验框"));
    assert_eq!(report.to_json(&fx.config)["failed"], 1);
    assert!(!extractor.workspaces()[0].exists());
  }

  #[test]
  fn every_video_is_reported_in_order() {
    let fx = fixture();
    let extractor = FakeExtractor::new(&[Frame::Blank]);
    let output = OutputDirectory::create(fx.out.path(), true).unwrap();
    let videos = vec![PathBuf::from("/d/x_司机室_0.mp4"), PathBuf::from("/d/x_司机室_1.mp4")];
    let report = VideoScanTask::new(&fx.config, &extractor)
      .run_task(videos.clone(), &FakeModel { drop_landms: false }, &output)
      .unwrap();

    let seen: Vec<_> = report.videos.iter().map(|v| v.video.clone()).collect();
    assert_eq!(seen, videos);
    assert_eq!(extractor.workspaces().len(), 2);
    assert!(extractor.workspaces().iter().all(|w| !w.exists()));
  }
}
