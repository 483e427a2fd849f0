use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use courtside::config::EngineConfig;
use courtside::tenant::TenantManager;
use courtside::wire;

const PASSWORD: &str = "courtside";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("courtside_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, EngineConfig::default()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, PASSWORD.to_string()).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("riverside")
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.unwrap_err();
    err.as_db_error().unwrap().code().code().to_string()
}

struct Venue {
    id: Ulid,
    sport_id: Ulid,
    courts: [Ulid; 2],
}

/// A venue open 06:00-22:00 with two 60 minute courts at 1000 per slot.
async fn register_venue(operator: &Client, operator_id: Ulid) -> Venue {
    let venue_id = Ulid::new();
    let sport_id = Ulid::new();
    let courts = [Ulid::new(), Ulid::new()];
    operator
        .batch_execute(&format!(
            "INSERT INTO venues (id, name, operator_id, opens_at, closes_at) \
             VALUES ('{venue_id}', 'Riverside', '{operator_id}', '06:00', '22:00')"
        ))
        .await
        .unwrap();
    operator
        .batch_execute(&format!(
            "INSERT INTO sports (id, venue_id, sport, base_price, slot_minutes) \
             VALUES ('{sport_id}', '{venue_id}', 'badminton', 1000, 60)"
        ))
        .await
        .unwrap();
    for (i, court) in courts.iter().enumerate() {
        operator
            .batch_execute(&format!(
                "INSERT INTO units (id, sport_id, name) VALUES ('{court}', '{sport_id}', 'Court {}')",
                i + 1
            ))
            .await
            .unwrap();
    }
    Venue {
        id: venue_id,
        sport_id,
        courts,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn slots_reflect_holds() {
    let addr = start_test_server().await;
    let operator_id = Ulid::new();
    let operator = connect(addr, &format!("operator:{operator_id}")).await;
    let venue = register_venue(&operator, operator_id).await;
    let court = venue.courts[0];

    let slots_sql = format!("SELECT * FROM slots WHERE unit_id = '{court}' AND date = '2030-01-15'");
    let slots = rows(&operator, &slots_sql).await;
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0].get("slot_id"), Some("06:00"));
    assert_eq!(slots[0].get("time_label"), Some("6:00 AM"));
    assert_eq!(slots[0].get("price"), Some("1000"));
    assert!(slots.iter().all(|s| s.get("status") == Some("available")));

    let player = connect(addr, &format!("player:{}", Ulid::new())).await;
    let receipt = rows(
        &player,
        &format!("INSERT INTO holds (unit_id, start) VALUES ('{court}', '2030-01-15 10:00') RETURNING *"),
    )
    .await;
    assert_eq!(receipt.len(), 1);
    assert_eq!(receipt[0].get("unit_id"), Some(court.to_string().as_str()));
    assert_eq!(receipt[0].get("assigned_unit_name"), Some("Court 1"));
    assert_eq!(receipt[0].get("expires_in_seconds"), Some("480"));

    let slots = rows(&operator, &slots_sql).await;
    let booked: Vec<_> = slots
        .iter()
        .filter(|s| s.get("status") == Some("booked"))
        .map(|s| s.get("slot_id").unwrap().to_string())
        .collect();
    assert_eq!(booked, ["10:00"]);
}

#[tokio::test]
async fn conflicting_hold_is_rejected_and_auto_assign_moves_on() {
    let addr = start_test_server().await;
    let operator_id = Ulid::new();
    let operator = connect(addr, &format!("operator:{operator_id}")).await;
    let venue = register_venue(&operator, operator_id).await;
    let court = venue.courts[0];

    let first = connect(addr, &format!("player:{}", Ulid::new())).await;
    let second = connect(addr, &format!("player:{}", Ulid::new())).await;
    let hold = format!(r#"INSERT INTO holds (unit_id, start, "end") VALUES ('{court}', '2030-01-15 18:00', '2030-01-15 19:00')"#);

    first.batch_execute(&hold).await.unwrap();
    assert_eq!(sqlstate(&second, &hold).await, "23P01");

    let by_sport = rows(
        &second,
        &format!(
            "INSERT INTO holds (sport_id, start) VALUES ('{}', '2030-01-15 18:00') RETURNING *",
            venue.sport_id
        ),
    )
    .await;
    assert_eq!(by_sport[0].get("assigned_unit_name"), Some("Court 2"));

    let sport_hold = format!(
        "INSERT INTO holds (sport_id, start) VALUES ('{}', '2030-01-15 18:30')",
        venue.sport_id
    );
    assert_eq!(sqlstate(&second, &sport_hold).await, "53400");
}

#[tokio::test]
async fn hold_confirm_and_list() {
    let addr = start_test_server().await;
    let operator_id = Ulid::new();
    let operator = connect(addr, &format!("operator:{operator_id}")).await;
    let venue = register_venue(&operator, operator_id).await;
    let court = venue.courts[1];

    let player_id = Ulid::new();
    let player = connect(addr, &format!("player:{player_id}")).await;
    let receipt = rows(
        &player,
        &format!("INSERT INTO holds (unit_id, start) VALUES ('{court}', '2030-02-01T07:00') RETURNING *"),
    )
    .await;
    let reservation_id = receipt[0].get("reservation_id").unwrap().to_string();

    let confirmed = rows(
        &player,
        &format!("INSERT INTO confirmations (reservation_id) VALUES ('{reservation_id}') RETURNING *"),
    )
    .await;
    assert_eq!(confirmed[0].get("status"), Some("confirmed"));
    assert_eq!(confirmed[0].get("start_iso"), Some("2030-02-01T07:00:00"));
    assert_eq!(confirmed[0].get("total_price"), Some("1000"));

    let upcoming = rows(
        &player,
        &format!("SELECT * FROM reservations WHERE requester_id = '{player_id}' AND scope = 'upcoming'"),
    )
    .await;
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].get("id"), Some(reservation_id.as_str()));

    // Confirming twice is not a valid transition.
    let again = format!("INSERT INTO confirmations (reservation_id) VALUES ('{reservation_id}')");
    assert_eq!(sqlstate(&player, &again).await, "55000");
}

#[tokio::test]
async fn walk_in_and_removal_by_operator() {
    let addr = start_test_server().await;
    let operator_id = Ulid::new();
    let operator = connect(addr, &format!("operator:{operator_id}")).await;
    let venue = register_venue(&operator, operator_id).await;
    let court = venue.courts[0];

    let walk_in = rows(
        &operator,
        &format!(
            r#"INSERT INTO walk_ins (unit_id, start, "end", price) VALUES ('{court}', '2030-03-01 09:00', '2030-03-01 10:00', 700) RETURNING *"#
        ),
    )
    .await;
    assert_eq!(walk_in[0].get("source"), Some("walk_in"));
    assert_eq!(walk_in[0].get("guest_name"), Some("Walk-In Customer"));
    assert_eq!(walk_in[0].get("total_price"), Some("700"));
    let id = walk_in[0].get("id").unwrap().to_string();

    let player = connect(addr, &format!("player:{}", Ulid::new())).await;
    let delete = format!("DELETE FROM reservations WHERE id = '{id}'");
    assert_eq!(sqlstate(&player, &delete).await, "42501");

    operator.batch_execute(&delete).await.unwrap();
    let lookup = format!("SELECT * FROM reservations WHERE id = '{id}'");
    assert_eq!(sqlstate(&operator, &lookup).await, "02000");
}

#[tokio::test]
async fn venue_stats_for_the_operator_only() {
    let addr = start_test_server().await;
    let operator_id = Ulid::new();
    let operator = connect(addr, &format!("operator:{operator_id}")).await;
    let venue = register_venue(&operator, operator_id).await;
    operator
        .batch_execute(&format!(
            r#"INSERT INTO walk_ins (unit_id, start, "end", price) VALUES ('{}', '2030-03-01 09:00', '2030-03-01 10:00', 700)"#,
            venue.courts[1]
        ))
        .await
        .unwrap();

    let stats_sql = format!("SELECT * FROM venue_stats WHERE venue_id = '{}'", venue.id);
    let stats = rows(&operator, &stats_sql).await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].get("revenue_total"), Some("700"));
    assert_eq!(stats[0].get("bookings_today"), Some("0"));

    let trend = rows(
        &operator,
        &format!("SELECT * FROM revenue_trend WHERE venue_id = '{}'", venue.id),
    )
    .await;
    assert_eq!(trend.len(), 30);

    let player = connect(addr, &format!("player:{}", Ulid::new())).await;
    assert_eq!(sqlstate(&player, &stats_sql).await, "42501");
}

#[tokio::test]
async fn session_errors_carry_codes() {
    let addr = start_test_server().await;

    let anonymous = connect(addr, "postgres").await;
    assert_eq!(sqlstate(&anonymous, "SELECT * FROM reservations WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'").await, "28000");

    let player = connect(addr, &format!("player:{}", Ulid::new())).await;
    assert_eq!(sqlstate(&player, "UPDATE reservations SET status = 'x'").await, "42601");
    assert_eq!(
        sqlstate(&player, &format!("INSERT INTO holds (unit_id, start) VALUES ('{}', '2030-01-01 10:00')", Ulid::new())).await,
        "02000"
    );
}
