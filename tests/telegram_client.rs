use serial_test::serial;
use std::env;
use tgsender::contract::{ChannelClient, ChatPrivileges};
use tgsender::telegram::BotApiClient;

/// Missing token must make the constructor fail.
#[test]
#[serial]
fn test_new_from_env_requires_token() {
    env::remove_var("TELEGRAM_BOT_TOKEN");
    assert!(BotApiClient::new_from_env().is_err());
}

#[test]
#[serial]
fn test_new_from_env_with_token_and_custom_server() {
    env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
    env::set_var("TELEGRAM_API_URL", "http://localhost:8081/");
    let client = BotApiClient::new_from_env();
    env::remove_var("TELEGRAM_BOT_TOKEN");
    env::remove_var("TELEGRAM_API_URL");
    assert!(client.is_ok());
}

#[tokio::test]
async fn test_bot_only_operations_fail_without_network() {
    // Port 9 (discard) on localhost: nothing is expected to be reached.
    let client = BotApiClient::new("123:abc", Some("http://127.0.0.1:9")).expect("client builds");

    let err = client
        .create_channel("title".to_string(), "description".to_string())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("create_channel"), "got: {err}");

    let err = client
        .add_members(-100, vec!["@alice".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("add_members"), "got: {err}");

    let err = client
        .promote_member(-100, "@alice".to_string(), ChatPrivileges::channel_admin())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("numeric"), "got: {err}");
}
