//! Tool handlers end to end against mock ComfyUI and WebUI servers.

use std::path::{Path, PathBuf};

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use tempfile::TempDir;

use imagegen_core::config::AppConfig;
use imagegen_mcp::handlers;
use imagegen_mcp::requests::{
    ComfyGenerateHdRequest, ComfyGenerateRequest, ControlNetReferenceRequest, InpaintingRequest, ListModelsRequest,
    ListOutputsRequest, WebuiGenerateRequest,
};
use imagegen_mcp::service::GenerationService;
use imagegen_webui::api::encode_image;

/// Address nothing listens on, for a backend that is down.
const CLOSED_URL: &str = "http://127.0.0.1:9";

struct Harness {
    dir: TempDir,
    service: GenerationService,
}

impl Harness {
    fn new(comfyui_url: &str, webui_url: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let env = move |key: &str| -> Option<String> {
            let value = match key {
                "COMFYUI_API_URL" => comfyui_url.to_string(),
                "WEBUI_API_URL" => webui_url.to_string(),
                "OUTPUT_DIR" => root.join("out").display().to_string(),
                "COMFYUI_PATH" => root.join("comfyui").display().to_string(),
                "SCRIPTS_DIR" => root.join("scripts").display().to_string(),
                "POLL_INTERVAL_MS" => "10".into(),
                "GENERATION_TIMEOUT_SECS" => "5".into(),
                "API_REQUEST_TIMEOUT_MS" => "500".into(),
                _ => return None,
            };
            Some(value)
        };
        let config = AppConfig::from_lookup(env).expect("config");
        let service = GenerationService::new(config).expect("service");
        Self { dir, service }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

async fn healthy_comfyui(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/system_stats");
            then.status(200).json_body(json!({ "system": {}, "devices": [] }));
        })
        .await;
}

async fn healthy_webui(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/options");
            then.status(200).json_body(json!({ "sd_model_checkpoint": "base" }));
        })
        .await;
}

async fn finished_job(server: &MockServer, prompt_id: &str, filename: &str) {
    let submit_body = json!({ "prompt_id": prompt_id, "number": 0, "node_errors": {} });
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/prompt");
            then.status(200).json_body(submit_body);
        })
        .await;

    let history_body = json!({
        prompt_id: {
            "status": { "status_str": "success", "completed": true, "messages": [] },
            "outputs": { "9": { "images": [{ "filename": filename, "subfolder": "", "type": "output" }] } }
        }
    });
    let history_path = format!("/history/{prompt_id}");
    server
        .mock_async(move |when, then| {
            when.method(GET).path(history_path);
            then.status(200).json_body(history_body);
        })
        .await;
}

#[tokio::test]
async fn comfyui_generate_relocates_reported_image() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;
    finished_job(&comfyui, "p-1", "door_00001_.png").await;

    let h = Harness::new(&comfyui.base_url(), CLOSED_URL);
    h.write("comfyui/output/door_00001_.png", b"png-bytes");

    let output = handlers::generate::run(
        &h.service,
        ComfyGenerateRequest {
            prompt: "an oak door".into(),
            output_name: Some("door".into()),
            quality_preset: Some("draft".into()),
            ..Default::default()
        },
    )
    .await
    .expect("generate");

    let delivered = h.path("out/door_00001_.png");
    assert_eq!(std::fs::read(&delivered).unwrap(), b"png-bytes");

    let data = &output.data;
    assert_eq!(data["result"]["method"], "comfyui_txt2img");
    assert_eq!(data["result"]["prompt_id"], "p-1");
    assert_eq!(data["result"]["relocated"], true);
    assert_eq!(data["settings"]["steps"], 15);
    assert!(output.summary.contains("door_00001_.png"));
}

#[tokio::test]
async fn webui_generate_writes_decoded_image() {
    let webui = MockServer::start_async().await;
    healthy_webui(&webui).await;
    let txt2img = webui
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sdapi/v1/txt2img")
                .body_contains("\"prompt\":\"a brass key\"")
                .body_contains("DPM++ 2M Karras");
            then.status(200).json_body(json!({
                "images": [encode_image(b"fake-png")],
                "parameters": {},
                "info": "{}"
            }));
        })
        .await;

    let h = Harness::new(CLOSED_URL, &webui.base_url());
    let output = handlers::webui::run(
        &h.service,
        WebuiGenerateRequest {
            prompt: "a brass key".into(),
            output_name: Some("key".into()),
            ..Default::default()
        },
    )
    .await
    .expect("webui generate");

    txt2img.assert_async().await;
    let path = PathBuf::from(output.data["result"]["output_path"].as_str().unwrap());
    assert!(path.starts_with(h.path("out")));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("key_") && name.ends_with(".png"), "{name}");
    assert_eq!(std::fs::read(&path).unwrap(), b"fake-png");
}

#[tokio::test]
async fn comfyui_generate_hd_submits_two_pass_graph() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;
    let submit = comfyui
        .mock_async(|when, then| {
            when.method(POST).path("/prompt").body_contains("LatentUpscaleBy");
            then.status(200)
                .json_body(json!({ "prompt_id": "p-hd", "number": 0, "node_errors": {} }));
        })
        .await;
    comfyui
        .mock_async(|when, then| {
            when.method(GET).path("/history/p-hd");
            then.status(200).json_body(json!({
                "p-hd": {
                    "status": { "status_str": "success", "completed": true, "messages": [] },
                    "outputs": { "9": { "images": [
                        { "filename": "ComfyUI_HD_00001_.png", "subfolder": "", "type": "output" }
                    ] } }
                }
            }));
        })
        .await;

    let h = Harness::new(&comfyui.base_url(), CLOSED_URL);
    h.write("comfyui/output/ComfyUI_HD_00001_.png", b"hd-bytes");

    let output = handlers::hd::run(
        &h.service,
        ComfyGenerateHdRequest {
            prompt: "a castle gate at dusk".into(),
            ..Default::default()
        },
    )
    .await
    .expect("hd generation");

    submit.assert_async().await;
    let delivered = h.path("out/ComfyUI_HD_00001_.png");
    assert_eq!(std::fs::read(&delivered).unwrap(), b"hd-bytes");

    let settings = &output.data["settings"];
    assert_eq!(settings["final_resolution"], "1536x1536");
    assert_eq!(settings["base_steps"], 28);
    assert_eq!(settings["refine_steps"], 12);
    assert_eq!(output.data["result"]["prompt_id"], "p-hd");
}

#[tokio::test]
async fn inpainting_falls_back_to_webui() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;
    let rejected = comfyui
        .mock_async(|when, then| {
            when.method(POST).path("/prompt");
            then.status(500).body("out of memory");
        })
        .await;

    let webui = MockServer::start_async().await;
    healthy_webui(&webui).await;
    webui
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sdapi/v1/img2img")
                .body_contains("\"inpaint_full_res\":true");
            then.status(200)
                .json_body(json!({ "images": [encode_image(b"inpainted")] }));
        })
        .await;

    let h = Harness::new(&comfyui.base_url(), &webui.base_url());
    let room = h.write("in/room.png", b"room");
    let mask = h.write("in/mask.png", b"mask");

    let output = handlers::inpaint::run(
        &h.service,
        InpaintingRequest {
            reference_image: room.display().to_string(),
            mask_image: mask.display().to_string(),
            prompt: "a hidden safe".into(),
            ..Default::default()
        },
    )
    .await
    .expect("inpainting");

    rejected.assert_async().await;
    assert_eq!(output.data["result"]["method"], "webui_inpainting_fallback");
    let failed = output.data["failed_methods"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["method"], "comfyui_inpainting");
    assert!(output.summary.starts_with("Inpainting completed via fallback"));

    // Both images were staged for ComfyUI before it failed.
    let staged = std::fs::read_dir(h.path("comfyui/input")).unwrap().count();
    assert_eq!(staged, 2);
}

#[tokio::test]
async fn inpainting_reports_every_failed_method() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;
    let rejected = comfyui
        .mock_async(|when, then| {
            when.method(POST).path("/prompt");
            then.status(500).body("out of memory");
        })
        .await;

    let webui = MockServer::start_async().await;
    healthy_webui(&webui).await;
    webui
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/img2img");
            then.status(500).body("CUDA error");
        })
        .await;

    let h = Harness::new(&comfyui.base_url(), &webui.base_url());
    let room = h.write("in/room.png", b"room");
    let mask = h.write("in/mask.png", b"mask");

    let err = handlers::inpaint::run(
        &h.service,
        InpaintingRequest {
            reference_image: room.display().to_string(),
            mask_image: mask.display().to_string(),
            prompt: "a hidden safe".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "GENERATION_FAILED");
    // ComfyUI inpainting, then the plain text-to-image attempt.
    rejected.assert_hits_async(2).await;

    let result = err.into_call_result("comfyui_inpainting");
    assert_eq!(result.is_error, Some(true));
    let blocks = serde_json::to_value(&result.content).unwrap();
    let text = blocks[0]["text"].as_str().unwrap();
    assert!(text.starts_with("Error [GENERATION_FAILED]: All 3 methods failed"), "{text}");
    assert!(text.contains("webui_inpainting_fallback: WebUI API error (500): CUDA error"), "{text}");
    assert!(text.contains("(simple_generation_fallback)"), "{text}");
    assert!(std::fs::read_dir(h.path("out")).map_or(true, |mut d| d.next().is_none()));
}

#[tokio::test]
async fn inpainting_rejects_missing_mask_before_any_backend_call() {
    let comfyui = MockServer::start_async().await;
    let any = comfyui
        .mock_async(|when, then| {
            when.any_request();
            then.status(200);
        })
        .await;

    let h = Harness::new(&comfyui.base_url(), CLOSED_URL);
    let room = h.write("in/room.png", b"room");

    let err = handlers::inpaint::run(
        &h.service,
        InpaintingRequest {
            reference_image: room.display().to_string(),
            mask_image: h.path("in/missing.png").display().to_string(),
            prompt: "a hidden safe".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "INVALID_ARGUMENT");
    assert!(err.to_string().contains("mask_image"));
    any.assert_hits_async(0).await;
}

#[tokio::test]
async fn controlnet_stages_reference_and_submits_canny_graph() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;
    let submit = comfyui
        .mock_async(|when, then| {
            when.method(POST)
                .path("/prompt")
                .body_contains("Canny")
                .body_contains("ControlNetApply");
            then.status(200)
                .json_body(json!({ "prompt_id": "p-cn", "number": 1, "node_errors": {} }));
        })
        .await;
    comfyui
        .mock_async(|when, then| {
            when.method(GET).path("/history/p-cn");
            then.status(200).json_body(json!({
                "p-cn": {
                    "status": { "status_str": "success", "completed": true, "messages": [] },
                    "outputs": { "12": { "images": [{ "filename": "ControlNet_Reference_00001_.png", "subfolder": "", "type": "output" }] } }
                }
            }));
        })
        .await;

    let h = Harness::new(&comfyui.base_url(), CLOSED_URL);
    let reference = h.write("in/hall.png", b"hall");
    h.write("comfyui/output/ControlNet_Reference_00001_.png", b"variation");

    let output = handlers::controlnet::run(
        &h.service,
        ControlNetReferenceRequest {
            reference_image: reference.display().to_string(),
            prompt: "the hall at night".into(),
            ..Default::default()
        },
    )
    .await
    .expect("controlnet");

    submit.assert_async().await;
    assert_eq!(output.data["settings"]["controlnet_type"], "canny");
    assert_eq!(output.data["settings"]["reference_strength"], 0.9);
    let staged = output.data["settings"]["staged_image"].as_str().unwrap();
    assert!(h.path("comfyui/input").join(staged).exists());
    assert_eq!(
        std::fs::read(h.path("out/ControlNet_Reference_00001_.png")).unwrap(),
        b"variation"
    );
}

#[tokio::test]
async fn check_services_reports_each_backend() {
    let comfyui = MockServer::start_async().await;
    healthy_comfyui(&comfyui).await;

    let h = Harness::new(&comfyui.base_url(), CLOSED_URL);
    let output = handlers::status::run(&h.service).await.expect("status");

    assert_eq!(output.data["comfyui"]["running"], true);
    assert_eq!(output.data["webui"]["running"], false);
    assert_eq!(output.data["webui"]["url"], CLOSED_URL);
    assert!(output.summary.contains("WebUI: not running"));
}

#[tokio::test]
async fn list_models_reads_checkpoint_dir_when_comfyui_is_down() {
    let h = Harness::new(CLOSED_URL, CLOSED_URL);
    h.write("comfyui/models/checkpoints/b.safetensors", b"");
    h.write("comfyui/models/checkpoints/a.ckpt", b"");
    h.write("comfyui/models/checkpoints/notes.txt", b"");

    let output = handlers::models::run(&h.service, ListModelsRequest::default())
        .await
        .expect("models");

    let lists = output.data.as_array().unwrap();
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0]["backend"], "ComfyUI");
    assert_eq!(lists[0]["source"], "local");
    assert_eq!(lists[0]["models"], json!(["a.ckpt", "b.safetensors"]));
    assert_eq!(lists[1]["source"], "unavailable");
}

#[tokio::test]
async fn list_models_queries_running_webui() {
    let webui = MockServer::start_async().await;
    healthy_webui(&webui).await;
    webui
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/sd-models");
            then.status(200).json_body(json!([
                { "title": "base.safetensors [abc]", "model_name": "base" }
            ]));
        })
        .await;
    let samplers = webui
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/samplers");
            then.status(200).json_body(json!([
                { "name": "Euler a", "aliases": ["k_euler_a"] },
                { "name": "DPM++ 2M Karras", "aliases": [] }
            ]));
        })
        .await;

    let h = Harness::new(CLOSED_URL, &webui.base_url());
    let output = handlers::models::run(
        &h.service,
        ListModelsRequest {
            service: Some("webui".into()),
        },
    )
    .await
    .expect("models");

    let lists = output.data.as_array().unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0]["source"], "api");
    assert_eq!(lists[0]["models"], json!(["base.safetensors [abc]"]));
    assert_eq!(lists[0]["samplers"], json!(["Euler a", "DPM++ 2M Karras"]));
    assert!(output.summary.contains("Samplers: Euler a, DPM++ 2M Karras"));
    samplers.assert_async().await;
}

#[tokio::test]
async fn list_outputs_limits_and_skips_non_images() {
    let h = Harness::new(CLOSED_URL, CLOSED_URL);
    for name in ["a.png", "b.jpg", "c.webp"] {
        h.write(&format!("out/{name}"), &[0u8; 2048]);
    }
    h.write("out/readme.txt", b"");

    let output = handlers::outputs::run(&h.service, ListOutputsRequest { limit: Some(2) })
        .await
        .expect("outputs");

    assert_eq!(output.data["count"], 2);
    let images = output.data["images"].as_array().unwrap();
    assert!(images.iter().all(|i| i["size_kb"] == 2.0));
    assert!(images
        .iter()
        .all(|i| Path::new(i["filename"].as_str().unwrap()).extension().unwrap() != "txt"));
}

#[tokio::test]
async fn list_outputs_on_empty_directory() {
    let h = Harness::new(CLOSED_URL, CLOSED_URL);
    let output = handlers::outputs::run(&h.service, ListOutputsRequest::default())
        .await
        .expect("outputs");
    assert_eq!(output.data["count"], 0);
    assert_eq!(output.summary, "No generated images found");
}
