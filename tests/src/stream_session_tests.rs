//! User stream session lifecycle against scripted connections

use crate::support::*;
use std::rc::Rc;
use std::time::Duration;
use tradepulse_core::Fixed;
use tradepulse_exchanges::binance::rest::USER_DATA_STREAM_PATH;
use tradepulse_exchanges::prelude::*;
use tradepulse_exchanges::HttpMethod;

const WS_URL: &str = "wss://stream.binance.test:9443";

type FakeSession = StreamSession<FakeIssuer, FakeConnector>;

fn session(issuer: FakeIssuer, connector: FakeConnector, policy: ReconnectPolicy) -> (Rc<FakeIssuer>, FakeSession) {
    let issuer = Rc::new(issuer);
    let session = StreamSession::new(Rc::clone(&issuer), connector, WS_URL, policy);
    (issuer, session)
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::fixed(Duration::from_millis(20))
}

async fn next_fill(fills: &flume::Receiver<FillEvent>) -> Option<FillEvent> {
    monoio::time::timeout(Duration::from_secs(1), fills.recv_async())
        .await
        .ok()
        .and_then(|received| received.ok())
}

#[cfg(test)]
mod startup {
    use super::*;

    #[monoio::test(enable_timer = true)]
    async fn test_missing_credentials_stay_idle() {
        let connector = FakeConnector::new();
        let (issuer, session) = session(FakeIssuer::without_credentials(), connector.clone(), fast_policy());

        let err = session.start().unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials(_)));
        assert!(err.is_configuration_fault());
        assert_eq!(session.state(), StreamState::Idle);

        monoio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(issuer.calls(), 0);
        assert_eq!(connector.connects(), 0);
    }

    #[monoio::test(enable_timer = true)]
    async fn test_connects_to_listen_key_url() {
        let connector = FakeConnector::new();
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), fast_policy());

        session.start().unwrap();
        session.start().unwrap();
        assert!(eventually(Duration::from_secs(1), || session.state() == StreamState::Connected).await);

        assert_eq!(issuer.calls(), 1);
        let urls = connector.urls();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "wss://stream.binance.test:9443/ws/listen-key-1");

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_account_client_issues_the_key() {
        let transport = FakeTransport::new().respond(USER_DATA_STREAM_PATH, 200, r#"{"listenKey":"pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"}"#);
        let client = Rc::new(test_client(transport));
        let connector = FakeConnector::new();
        let session = StreamSession::new(Rc::clone(&client), connector.clone(), WS_URL, fast_policy());

        session.start().unwrap();
        assert!(eventually(Duration::from_secs(1), || connector.connects() == 1).await);

        let url = &connector.urls()[0];
        assert!(url.path().starts_with("/ws/pqia91ma19"));
        let request = client.transport().last(USER_DATA_STREAM_PATH).unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("X-MBX-APIKEY"), Some(TEST_API_KEY));

        session.close().await;
    }
}

#[cfg(test)]
mod delivery {
    use super::*;

    #[monoio::test(enable_timer = true)]
    async fn test_filled_report_reaches_every_subscriber() {
        let report = execution_report("ETHBTC", "BUY", "FILLED", "1.00000000", "0.10264410");
        let connector = FakeConnector::new().then(Script::Open(vec![
            Step::Wait(Duration::from_millis(20)),
            Step::Message(report),
        ]));
        let (_, session) = session(FakeIssuer::new(), connector, fast_policy());
        let first = session.subscribe();
        let second = session.subscribe();

        session.start().unwrap();

        let fill = next_fill(&first).await.expect("fill delivered");
        assert_eq!(fill.symbol, "ETHBTC");
        assert_eq!(fill.side, OrderSide::Buy);
        assert_eq!(fill.quantity, Fixed::ONE);
        assert_eq!(fill.price, Fixed::from_str_exact("0.1026441").unwrap());
        assert_eq!(next_fill(&second).await, Some(fill));

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_non_fill_events_are_dropped() {
        let connector = FakeConnector::new().then(Script::Open(vec![
            Step::Message(execution_report("ETHBTC", "BUY", "NEW", "1", "0.1")),
            Step::Message(execution_report("ETHBTC", "BUY", "PARTIALLY_FILLED", "1", "0.1")),
            Step::Message(r#"{"e":"outboundAccountPosition","E":1564034571105,"u":1564034571073,"B":[]}"#.to_string()),
            Step::Message(execution_report("BNBUSDT", "SELL", "FILLED", "2", "300.5")),
        ]));
        let (_, session) = session(FakeIssuer::new(), connector, fast_policy());
        let fills = session.subscribe();
        session.start().unwrap();

        let fill = next_fill(&fills).await.expect("fill delivered");
        assert_eq!(fill.symbol, "BNBUSDT");
        assert_eq!(fill.side, OrderSide::Sell);
        assert!(fills.is_empty());

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_malformed_message_keeps_connection() {
        let connector = FakeConnector::new().then(Script::Open(vec![
            Step::Message("this is not json".to_string()),
            Step::Message(r#"{"e":"executionReport","X":"FILLED"}"#.to_string()),
            Step::Message(execution_report("ETHBTC", "SELL", "FILLED", "0.5", "0.2")),
        ]));
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), fast_policy());
        let fills = session.subscribe();
        session.start().unwrap();

        let fill = next_fill(&fills).await.expect("fill after malformed messages");
        assert_eq!(fill.quantity, Fixed::from_str_exact("0.5").unwrap());
        assert_eq!(session.state(), StreamState::Connected);
        assert_eq!(connector.connects(), 1);
        assert_eq!(issuer.calls(), 1);

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_undecodable_frame_keeps_connection() {
        let connector = FakeConnector::new().then(Script::Open(vec![
            Step::Fail(ExchangeError::MalformedMessage("Invalid UTF-8 in text frame".to_string())),
            Step::Message(execution_report("BNBUSDT", "BUY", "FILLED", "3", "250")),
        ]));
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), fast_policy());
        let fills = session.subscribe();
        session.start().unwrap();

        let fill = next_fill(&fills).await.expect("fill after undecodable frame");
        assert_eq!(fill.symbol, "BNBUSDT");
        assert_eq!(session.state(), StreamState::Connected);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 0);
        assert_eq!(issuer.calls(), 1);

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_dropped_subscriber_does_not_block_others() {
        let connector = FakeConnector::new().then(Script::Open(vec![
            Step::Wait(Duration::from_millis(20)),
            Step::Message(execution_report("ETHBTC", "BUY", "FILLED", "1", "0.1")),
            Step::Message(execution_report("ETHBTC", "BUY", "FILLED", "2", "0.1")),
        ]));
        let (_, session) = session(FakeIssuer::new(), connector, fast_policy());
        let kept = session.subscribe();
        drop(session.subscribe());
        session.start().unwrap();

        assert_eq!(next_fill(&kept).await.map(|f| f.quantity), Some(Fixed::ONE));
        assert_eq!(next_fill(&kept).await.map(|f| f.quantity), Some(Fixed::from_i64(2)));

        session.close().await;
    }
}

#[cfg(test)]
mod reconnect {
    use super::*;

    #[monoio::test(enable_timer = true)]
    async fn test_remote_close_triggers_exactly_one_new_cycle() {
        let connector = FakeConnector::new()
            .then(Script::Open(vec![Step::Drop]))
            .then(Script::Open(Vec::new()));
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), fast_policy());
        session.start().unwrap();

        assert!(eventually(Duration::from_secs(1), || connector.connects() == 2).await);
        monoio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(connector.connects(), 2);
        assert_eq!(issuer.calls(), 2);
        assert_eq!(session.state(), StreamState::Connected);
        let urls = connector.urls();
        assert!(urls[0].as_str().ends_with("/ws/listen-key-1"));
        assert!(urls[1].as_str().ends_with("/ws/listen-key-2"));

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_read_error_restarts_after_delay() {
        let connector = FakeConnector::new()
            .then(Script::Open(vec![Step::Fail(ExchangeError::ConnectionFailed("reset by peer".to_string()))]))
            .then(Script::Open(Vec::new()));
        let policy = ReconnectPolicy::fixed(Duration::from_millis(100));
        let (_, session) = session(FakeIssuer::new(), connector.clone(), policy);
        session.start().unwrap();

        assert!(eventually(Duration::from_millis(50), || session.state() == StreamState::Disconnected).await);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);

        assert!(eventually(Duration::from_secs(1), || session.state() == StreamState::Connected).await);
        assert_eq!(connector.connects(), 2);

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_gives_up_after_max_attempts() {
        let connector = FakeConnector::refusing();
        let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);
        let (_, session) = session(FakeIssuer::new(), connector.clone(), policy);
        session.start().unwrap();

        monoio::time::sleep(Duration::from_millis(200)).await;
        // First attempt plus two restarts
        assert_eq!(connector.connects(), 3);
        assert_eq!(session.state(), StreamState::Disconnected);

        session.close().await;
        assert_eq!(session.state(), StreamState::Closed);
    }

    #[monoio::test(enable_timer = true)]
    async fn test_credential_failure_is_retried_by_default() {
        let issuer = FakeIssuer::new().fail_next(ExchangeError::AuthenticationError(
            401,
            r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#.to_string(),
        ));
        let connector = FakeConnector::new();
        let (issuer, session) = session(issuer, connector.clone(), fast_policy());
        session.start().unwrap();

        assert!(eventually(Duration::from_secs(1), || session.state() == StreamState::Connected).await);
        assert_eq!(issuer.calls(), 2);
        assert_eq!(connector.connects(), 1);

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_credential_failure_without_retry_stops() {
        let issuer = FakeIssuer::new().fail_next(ExchangeError::NetworkError("refused".to_string()));
        let connector = FakeConnector::new();
        let policy = fast_policy().with_credential_retry(false);
        let (issuer, session) = session(issuer, connector.clone(), policy);
        session.start().unwrap();

        monoio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(issuer.calls(), 1);
        assert_eq!(connector.connects(), 0);
        assert_eq!(session.state(), StreamState::Idle);

        session.close().await;
    }

    #[monoio::test(enable_timer = true)]
    async fn test_stopped_session_can_be_started_again() {
        let issuer = FakeIssuer::new().fail_next(ExchangeError::NetworkError("refused".to_string()));
        let connector = FakeConnector::new();
        let policy = fast_policy().with_credential_retry(false);
        let (issuer, session) = session(issuer, connector.clone(), policy);
        session.start().unwrap();

        monoio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state(), StreamState::Idle);
        assert_eq!(connector.connects(), 0);

        session.start().unwrap();
        assert!(eventually(Duration::from_secs(1), || session.state() == StreamState::Connected).await);
        assert_eq!(issuer.calls(), 2);
        assert_eq!(connector.connects(), 1);

        session.close().await;
    }
}

#[cfg(test)]
mod shutdown {
    use super::*;

    #[monoio::test(enable_timer = true)]
    async fn test_close_stops_a_connected_session() {
        let connector = FakeConnector::new();
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), fast_policy());
        let fills = session.subscribe();
        session.start().unwrap();
        assert!(eventually(Duration::from_secs(1), || session.state() == StreamState::Connected).await);

        session.close().await;
        assert_eq!(session.state(), StreamState::Closed);
        assert_eq!(connector.closes(), 1);

        monoio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.connects(), 1);
        assert_eq!(issuer.calls(), 1);
        assert!(fills.is_empty());
    }

    #[monoio::test(enable_timer = true)]
    async fn test_close_cancels_pending_restart() {
        let connector = FakeConnector::new().then(Script::Open(vec![Step::Drop]));
        let policy = ReconnectPolicy::fixed(Duration::from_millis(200));
        let (issuer, session) = session(FakeIssuer::new(), connector.clone(), policy);
        session.start().unwrap();

        assert!(eventually(Duration::from_millis(100), || session.state() == StreamState::Disconnected).await);
        session.close().await;
        assert_eq!(session.state(), StreamState::Closed);

        monoio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(connector.connects(), 1);
        assert_eq!(issuer.calls(), 1);
    }

    #[monoio::test(enable_timer = true)]
    async fn test_close_is_idempotent_and_final() {
        let (_, session) = session(FakeIssuer::new(), FakeConnector::new(), fast_policy());
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), StreamState::Closed);

        let err = session.start().unwrap_err();
        assert!(matches!(err, ExchangeError::ConfigurationError(_)));
        assert_eq!(session.state(), StreamState::Closed);
    }
}
