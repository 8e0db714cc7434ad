use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;

const LOG: &str = r#"{"msg_type":"coco","types":{"Person":{"static_properties":{"name":{"type":"string"}}},"Room":{"static_properties":{"owner":{"type":"item","domain":"Person"}}}},"items":{"p1":{"types":["Person"],"properties":{"name":"Ada"}}}}
{"msg_type":"new_type","name":"Sensor","parents":["Room"],"dynamic_properties":{"temp":{"type":"float","min":-40,"max":60}}}
{"msg_type":"new_item","id":"s1","types":["Sensor"],"properties":{"owner":"p1"}}

{"msg_type":"new_data","id":"s1","value":{"data":{"temp":21.5},"timestamp":1700000000000}}
"#;

fn write_log(dir: &Path, body: &str) -> String {
    let input = dir.join("coco.jsonl");
    fs::write(&input, body).unwrap();
    input.to_str().unwrap().to_string()
}

#[test]
fn replay_prints_types_and_items() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), LOG);

    Command::cargo_bin("coco")?
        .args(["replay", "--input", &input])
        .assert()
        .success()
        .stdout(contains("type Sensor : Room"))
        .stdout(contains("dynamic temp: float [-40, 60]"))
        .stdout(contains("item p1 \"Ada\" : Person"))
        .stdout(contains("owner = Ada"))
        .stdout(contains("temp = 21.5"));
    Ok(())
}

#[test]
fn rejected_messages_are_skipped_unless_strict() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let body = format!("{LOG}{}\n", r#"{"msg_type":"new_data","id":"ghost","data":{},"timestamp":0}"#);
    let input = write_log(dir.path(), &body);

    Command::cargo_bin("coco")?
        .args(["replay", "--input", &input])
        .assert()
        .success()
        .stdout(contains("item s1"));

    Command::cargo_bin("coco")?
        .args(["replay", "--strict", "--input", &input])
        .assert()
        .failure()
        .stderr(contains("line 6"));
    Ok(())
}

#[test]
fn invalid_json_line_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_log(dir.path(), "{\"msg_type\":\"coco\"}\nnot json\n");

    Command::cargo_bin("coco")?
        .args(["replay", "--input", &input])
        .assert()
        .failure()
        .stderr(contains("line 2: invalid JSON"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn fake_queries_the_configured_server() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fake/Sensor"))
        .and(query_param("parameters", r#"["temp"]"#))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"temp": 7.5})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let input = write_log(dir.path(), LOG);
    let host = server.uri();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("coco")
            .unwrap()
            .env("COCO_TOKEN", "t0k")
            .args(["fake", "--input", &input, "--host", &host, "--type", "Sensor", "--param", "temp"])
            .assert()
            .success()
            .stdout(contains("\"temp\": 7.5"));
    })
    .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_failure_exits_with_server_message() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/data/s1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"message": "bad range"})),
        )
        .mount(&server)
        .await;

    let dir = tempdir()?;
    let input = write_log(dir.path(), LOG);
    let host = server.uri();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("coco")
            .unwrap()
            .env_remove("COCO_TOKEN")
            .args(["publish", "--input", &input, "--host", &host, "--item", "s1", "--data", r#"{"temp":99}"#])
            .assert()
            .failure()
            .stderr(contains("bad range"));
    })
    .await?;
    Ok(())
}
