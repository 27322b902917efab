//! Adapters driven against stand-in tool scripts.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_matches::assert_matches;
use audiobot_core::convert::AudioFormat;
use audiobot_core::job::{Artifact, InputMedia, JobError, JobExecutor, JobSpec};
use audiobot_core::params::{
    GenerateParams, JobParams, MdxParams, RvcParams, RvcTrainParams, SttParams, TtsParams,
};
use audiobot_core::progress::{self, Progress, ProgressReporter};
use audiobot_core::types::TaskId;
use audiobot_pipeline::{ToolExecutor, ToolPaths};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Write an executable `/bin/sh` script named `name` into `dir`.
fn write_tool(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write tool script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn job(params: JobParams, prompt: &str) -> JobSpec {
    JobSpec {
        task_id: TaskId(42),
        prompt: prompt.to_string(),
        params,
    }
}

fn input(filename: &str, data: &[u8]) -> Option<InputMedia> {
    Some(InputMedia {
        data: data.to_vec(),
        filename: filename.to_string(),
        message: None,
    })
}

fn media_names(artifact: &Artifact) -> Vec<(String, AudioFormat)> {
    match artifact {
        Artifact::Media { files, .. } => files
            .iter()
            .map(|f| (f.filename.clone(), f.format))
            .collect(),
        other => panic!("expected media artifact, got {other:?}"),
    }
}

fn media_path(artifact: &Artifact, index: usize) -> &Path {
    match artifact {
        Artifact::Media { files, .. } => &files[index].path,
        other => panic!("expected media artifact, got {other:?}"),
    }
}

#[tokio::test]
async fn tts_pipes_prompt_and_returns_voice() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(
        &dir,
        "tts",
        r#"while [ $# -gt 0 ]; do
  case "$1" in
    --out_path) out="$2"; shift 2;;
    *) shift;;
  esac
done
cat > "$out"
"#,
    );
    let executor = ToolExecutor::new(ToolPaths {
        tts: Some(bin),
        ..Default::default()
    });

    let job_spec = job(
        JobParams::Tts(TtsParams {
            model: "vits".to_string(),
        }),
        "hello from the queue",
    );
    let artifact = executor
        .execute(&CancellationToken::new(), &job_spec, None, ProgressReporter::disconnected())
        .await
        .unwrap();

    assert_eq!(
        media_names(&artifact),
        vec![("tts-42.ogg".to_string(), AudioFormat::Opus)]
    );
    let written = std::fs::read_to_string(media_path(&artifact, 0)).unwrap();
    assert_eq!(written, "hello from the queue");
}

#[tokio::test]
async fn mdx_reports_progress_and_collects_stems() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(
        &dir,
        "mdx",
        r#"while [ $# -gt 0 ]; do
  case "$1" in
    --input_audio) in="$2"; shift 2;;
    --output_folder) out="$2"; shift 2;;
    *) shift;;
  esac
done
echo "Separating"
printf ' 50%%|#####     |\r100%%|##########|\n'
cp "$in" "$out/mdx_vocals.wav"
cp "$in" "$out/mdx_instrum.wav"
"#,
    );
    let executor = ToolExecutor::new(ToolPaths {
        mdx: Some(bin),
        ..Default::default()
    });

    let (reporter, mut events) = progress::channel();
    let job_spec = job(JobParams::Mdx(MdxParams::default()), "");
    let artifact = executor
        .execute(
            &CancellationToken::new(),
            &job_spec,
            input("my song.flac", b"RIFF...."),
            reporter,
        )
        .await
        .unwrap();

    assert_eq!(
        media_names(&artifact),
        vec![
            ("my song (Instrumental).mp3".to_string(), AudioFormat::Mp3),
            ("my song (Vocals).mp3".to_string(), AudioFormat::Mp3),
        ]
    );

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            Progress::new("Separating", 0),
            Progress::new("Separating", 50),
            Progress::new("Separating", 100),
        ]
    );
}

#[tokio::test]
async fn stt_returns_transcript_text() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(
        &dir,
        "stt",
        r#"for last; do :; done
printf '  hello world\n' > "${last%.wav}.txt"
"#,
    );
    let executor = ToolExecutor::new(ToolPaths {
        stt: Some(bin),
        ..Default::default()
    });

    let job_spec = job(JobParams::Stt(SttParams::default()), "");
    let artifact = executor
        .execute(
            &CancellationToken::new(),
            &job_spec,
            input("voice.ogg", b"OggS"),
            ProgressReporter::disconnected(),
        )
        .await
        .unwrap();

    assert_matches!(artifact, Artifact::Text(text) if text == "hello world");
}

#[tokio::test]
async fn generator_without_output_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(&dir, "audiogen", "echo generating\n");
    let executor = ToolExecutor::new(ToolPaths {
        audiogen: Some(bin),
        ..Default::default()
    });

    let job_spec = job(JobParams::AudioGen(GenerateParams::default()), "rain on a tin roof");
    let result = executor
        .execute(&CancellationToken::new(), &job_spec, None, ProgressReporter::disconnected())
        .await;

    assert_matches!(result, Err(JobError::MissingOutput(path)) if path.ends_with("0.wav"));
}

#[tokio::test]
async fn musicgen_needs_input_media() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(&dir, "musicgen", "exit 0\n");
    let executor = ToolExecutor::new(ToolPaths {
        musicgen: Some(bin),
        ..Default::default()
    });

    let job_spec = job(JobParams::MusicGen(GenerateParams::default()), "lofi");
    let result = executor
        .execute(
            &CancellationToken::new(),
            &job_spec,
            input("empty.wav", b""),
            ProgressReporter::disconnected(),
        )
        .await;

    assert_matches!(result, Err(JobError::EmptyInput));
}

#[tokio::test]
async fn failing_tool_reports_stage_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(&dir, "tts", "echo 'unknown model' >&2\nexit 1\n");
    let executor = ToolExecutor::new(ToolPaths {
        tts: Some(bin),
        ..Default::default()
    });

    let job_spec = job(
        JobParams::Tts(TtsParams {
            model: "nope".to_string(),
        }),
        "hi",
    );
    let err = executor
        .execute(&CancellationToken::new(), &job_spec, None, ProgressReporter::disconnected())
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Tool { stage: "TTS", .. });
    assert!(err.to_string().contains("unknown model"));
}

#[tokio::test]
async fn canceled_separation_stops_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_tool(&dir, "mdx", "echo starting\nsleep 30\n");
    let executor = ToolExecutor::new(ToolPaths {
        mdx: Some(bin),
        ..Default::default()
    });

    let scope = CancellationToken::new();
    let canceler = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceler.cancel();
    });

    let job_spec = job(JobParams::Mdx(MdxParams::default()), "");
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute(&scope, &job_spec, input("a.wav", b"RIFF"), ProgressReporter::disconnected()),
    )
    .await
    .expect("canceled job should return promptly");

    assert_matches!(result, Err(JobError::Canceled));
}

#[tokio::test]
async fn unconfigured_kind_is_rejected() {
    let executor = ToolExecutor::new(ToolPaths::default());
    let job_spec = job(JobParams::AudioGen(GenerateParams::default()), "wind");
    let result = executor
        .execute(&CancellationToken::new(), &job_spec, None, ProgressReporter::disconnected())
        .await;
    assert_matches!(result, Err(JobError::Rejected(_)));
}

// ---------------------------------------------------------------------------
// Voice conversion and training
// ---------------------------------------------------------------------------

fn rvc_tools(models: &TempDir, rvc: PathBuf, train: PathBuf) -> ToolExecutor {
    ToolExecutor::new(ToolPaths {
        rvc: Some(rvc),
        rvc_train: Some(train),
        rvc_model_dir: Some(models.path().to_path_buf()),
        ..Default::default()
    })
}

fn train_params(model: &str, epochs: u32) -> JobParams {
    JobParams::RvcTrain(RvcTrainParams {
        model: model.to_string(),
        method: "harvest".to_string(),
        batch_size: 4,
        epochs,
        delete: false,
    })
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn rvc_passes_model_method_and_given_options() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    std::fs::write(models.path().join("singer.pth"), b"weights").unwrap();
    std::fs::write(models.path().join("singer_added.index"), b"index").unwrap();
    let rvc = write_tool(
        &tools,
        "rvc",
        r#"printf '%s\n' "$@" > args.txt
while [ $# -gt 0 ]; do
  case "$1" in
    --opt_path) out="$2"; shift 2;;
    *) shift;;
  esac
done
printf converted > "$out"
"#,
    );
    let executor = rvc_tools(&models, rvc, PathBuf::from("/nonexistent"));

    let job_spec = job(
        JobParams::Rvc(RvcParams {
            model: "singer".to_string(),
            method: "crepe".to_string(),
            pitch: Some(-3),
            filter_radius: Some(5),
            index_rate: Some(0.5),
            rms_mix_rate: None,
        }),
        "singer",
    );
    let artifact = executor
        .execute(
            &CancellationToken::new(),
            &job_spec,
            input("voice.ogg", b"OggS"),
            ProgressReporter::disconnected(),
        )
        .await
        .unwrap();

    assert_eq!(
        media_names(&artifact),
        vec![("rvc-42.ogg".to_string(), AudioFormat::Opus)]
    );
    let out = media_path(&artifact, 0);
    assert_eq!(std::fs::read(out).unwrap(), b"converted");

    let staged_input = out.with_file_name("rvc-in.wav");
    let index = models.path().join("singer_added.index");
    let expected: Vec<String> = [
        "--input_path",
        &staged_input.display().to_string(),
        "--model_name",
        "singer.pth",
        "--index_path",
        &index.display().to_string(),
        "--opt_path",
        &out.display().to_string(),
        "--f0method",
        "crepe",
        "--filter_radius",
        "5",
        "--index_rate",
        "0.500000",
        "--f0up_key",
        "-3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(lines(&tools.path().join("args.txt")), expected);
}

#[tokio::test]
async fn rvc_rejects_unknown_model() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    let rvc = write_tool(&tools, "rvc", "touch ran\n");
    let executor = rvc_tools(&models, rvc, PathBuf::from("/nonexistent"));

    let job_spec = job(
        JobParams::Rvc(RvcParams {
            model: "ghost".to_string(),
            method: "harvest".to_string(),
            pitch: None,
            filter_radius: None,
            index_rate: None,
            rms_mix_rate: None,
        }),
        "ghost",
    );
    let result = executor
        .execute(
            &CancellationToken::new(),
            &job_spec,
            input("voice.ogg", b"OggS"),
            ProgressReporter::disconnected(),
        )
        .await;

    assert_matches!(result, Err(JobError::Rejected(msg)) if msg == "model ghost not found");
    assert!(!tools.path().join("ran").exists());
}

#[tokio::test]
async fn training_installs_final_checkpoint() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    let train = write_tool(
        &tools,
        "train",
        r#"test -f rvc-train-config.json || exit 9
mkdir -p data/training/RVC/voice/models/e_1
echo "loading dataset"
echo "1 10 0.5000"
echo "1 11 0.4000"
echo "2 20 0.2500"
printf weights > data/training/RVC/voice/models/e_1/voice.pth
printf index > data/training/RVC/voice/voice_added.index
"#,
    );
    let executor = rvc_tools(&models, PathBuf::from("/nonexistent"), train);

    let (reporter, mut events) = progress::channel();
    let artifact = executor
        .execute(
            &CancellationToken::new(),
            &job(train_params("voice", 2), "voice"),
            input("dataset.wav", b"RIFF"),
            reporter,
        )
        .await
        .unwrap();

    assert_matches!(artifact, Artifact::Notice(text) if text == "🤡 Model voice trained");
    assert_eq!(std::fs::read(models.path().join("voice.pth")).unwrap(), b"weights");
    assert_eq!(
        std::fs::read(models.path().join("voice_added.index")).unwrap(),
        b"index"
    );

    let config: serde_json::Value =
        serde_json::from_slice(&std::fs::read(tools.path().join("rvc-train-config.json")).unwrap())
            .unwrap();
    assert_eq!(config["model"], "voice");
    assert_eq!(config["alg"], "harvest");
    assert_eq!(config["batch_size"], 4);
    assert_eq!(config["epochs"], 2);
    assert!(config["src_dir"].is_string());

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            Progress::new("🔨 Processing (loss: 0.50)", 50),
            Progress::new("🔨 Processing (loss: 0.25)", 100),
            Progress::new("Copying results...", -1),
        ]
    );
}

#[tokio::test]
async fn training_refuses_existing_model() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    std::fs::write(models.path().join("voice.pth"), b"weights").unwrap();
    std::fs::write(models.path().join("voice_added.index"), b"index").unwrap();
    let train = write_tool(&tools, "train", "touch ran\n");
    let executor = rvc_tools(&models, PathBuf::from("/nonexistent"), train);

    let result = executor
        .execute(
            &CancellationToken::new(),
            &job(train_params("voice", 2), "voice"),
            input("dataset.wav", b"RIFF"),
            ProgressReporter::disconnected(),
        )
        .await;

    assert_matches!(result, Err(JobError::Rejected(msg)) if msg == "model voice already exists");
    assert!(!tools.path().join("ran").exists());
    assert!(!tools.path().join("rvc-train-config.json").exists());
    assert_eq!(std::fs::read(models.path().join("voice.pth")).unwrap(), b"weights");
}

#[tokio::test]
async fn failed_training_removes_partial_results() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    std::fs::write(models.path().join("voice.pth"), b"stale").unwrap();
    let train = write_tool(
        &tools,
        "train",
        r#"mkdir -p data/training/RVC/voice/models/e_0
printf partial > data/training/RVC/voice/models/e_0/voice.pth
echo "out of memory" >&2
exit 1
"#,
    );
    let executor = rvc_tools(&models, PathBuf::from("/nonexistent"), train);

    let err = executor
        .execute(
            &CancellationToken::new(),
            &job(train_params("voice", 2), "voice"),
            input("dataset.wav", b"RIFF"),
            ProgressReporter::disconnected(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Tool { stage: "RVC train", .. });
    assert!(err.to_string().contains("out of memory"));
    assert!(!tools.path().join("data/training/RVC/voice").exists());
    assert!(!models.path().join("voice.pth").exists());
}

#[tokio::test]
async fn canceled_training_removes_partial_results() {
    let tools = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    let train = write_tool(
        &tools,
        "train",
        r#"mkdir -p data/training/RVC/voice/models/e_0
echo "1 1 0.9000"
sleep 30
"#,
    );
    let executor = rvc_tools(&models, PathBuf::from("/nonexistent"), train);

    let scope = CancellationToken::new();
    let canceler = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceler.cancel();
    });

    let job_spec = job(train_params("voice", 2), "voice");
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute(
            &scope,
            &job_spec,
            input("dataset.wav", b"RIFF"),
            ProgressReporter::disconnected(),
        ),
    )
    .await
    .expect("canceled training should return promptly");

    assert_matches!(result, Err(JobError::Canceled));
    assert!(!tools.path().join("data/training/RVC/voice").exists());
}

