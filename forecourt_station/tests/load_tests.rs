use std::{sync::Arc, time::Duration};

use forecourt_station::{
    DispensingUnit, FuelStation, FuelType, SimulatedPump, Station, StationError, UnitPrice,
    Volume,
};
use tokio::time::timeout;

const EPS: f64 = 1e-6;

fn litres(value: f64) -> Volume {
    Volume::from_litres(value).unwrap()
}

fn price(value: f64) -> UnitPrice {
    UnitPrice::new(value).unwrap()
}

fn pump(fuel: FuelType, capacity: f64, rate: f64) -> Arc<SimulatedPump> {
    Arc::new(SimulatedPump::with_rate(fuel, litres(capacity), rate))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_share_two_units_exactly() {
    let station = Arc::new(Station::new());
    let pumps = [
        pump(FuelType::Regular, 10.0, 50.0),
        pump(FuelType::Regular, 10.0, 50.0),
    ];
    for pump in &pumps {
        station.add_unit(pump.clone());
    }
    station.set_price(FuelType::Regular, price(1.5));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let station = Arc::clone(&station);
            tokio::spawn(async move {
                station
                    .request(FuelType::Regular, litres(2.5), price(2.0))
                    .await
            })
        })
        .collect();

    let all = timeout(Duration::from_secs(10), async {
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    })
    .await
    .unwrap();

    assert!(all.iter().all(|result| matches!(result, Ok(charged) if *charged == price(1.5))));
    assert!((station.total_revenue() - 8.0 * 2.5 * 1.5).abs() < EPS);
    assert_eq!(station.sales_count(), 8);
    for pump in &pumps {
        assert_eq!(pump.overlapping_withdrawals(), 0);
        assert_eq!(pump.remaining(), Volume::ZERO);
        assert_eq!(pump.completed_withdrawals(), 4);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_small_purchases_drain_every_unit() {
    let station = Arc::new(Station::new());
    let mut pumps = Vec::new();
    for fuel in [FuelType::Regular, FuelType::Diesel] {
        for _ in 0..2 {
            let unit = pump(fuel, 10.0, 100.0);
            station.add_unit(unit.clone());
            pumps.push(unit);
        }
        station.set_price(fuel, price(1.0));
    }

    let mut handles = Vec::new();
    for _ in 0..200 {
        for fuel in [FuelType::Regular, FuelType::Diesel] {
            let station = Arc::clone(&station);
            handles.push(tokio::spawn(async move {
                station.request(fuel, litres(0.1), price(2.0)).await
            }));
        }
    }

    timeout(Duration::from_secs(30), async {
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), price(1.0));
        }
    })
    .await
    .unwrap();

    for fuel in [FuelType::Regular, FuelType::Diesel] {
        let result = station.request(fuel, litres(0.1), price(2.0)).await;
        assert!(matches!(result, Err(StationError::NoCapacity { .. })));
    }

    assert!((station.total_revenue() - 40.0).abs() < EPS);
    assert_eq!(station.sales_count(), 400);
    assert_eq!(station.no_capacity_cancellations(), 2);
    assert_eq!(station.too_expensive_cancellations(), 0);
    for pump in &pumps {
        assert_eq!(pump.remaining(), Volume::ZERO);
        assert_eq!(pump.overlapping_withdrawals(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn counters_account_for_every_priced_request() {
    let station = Arc::new(Station::new());
    let capacities = [7.0, 3.5, 12.0];
    let pumps: Vec<_> = capacities
        .iter()
        .map(|capacity| pump(FuelType::Super, *capacity, 200.0))
        .collect();
    for pump in &pumps {
        station.add_unit(pump.clone());
    }
    station.set_price(FuelType::Super, price(2.0));

    // Mix of affordable, too expensive, oversized and unpriced requests.
    let requests: Vec<(FuelType, f64, f64)> = (0..120)
        .map(|index| match index % 6 {
            0 => (FuelType::Super, 1.0, 1.5),
            1 => (FuelType::Super, 15.0, 3.0),
            2 => (FuelType::Diesel, 1.0, 3.0),
            3 => (FuelType::Super, 0.75, 2.0),
            _ => (FuelType::Super, 0.5 + (index % 4) as f64 * 0.25, 2.5),
        })
        .collect();

    let handles: Vec<_> = requests
        .iter()
        .map(|(fuel, amount, max_price)| {
            let station = Arc::clone(&station);
            let (fuel, amount, max_price) = (*fuel, litres(*amount), price(*max_price));
            tokio::spawn(async move {
                (amount, station.request(fuel, amount, max_price).await)
            })
        })
        .collect();

    let mut sold = Volume::ZERO;
    let mut expected_revenue = 0.0;
    let mut unpriced = 0;
    let outcomes = timeout(Duration::from_secs(30), async {
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    })
    .await
    .unwrap();
    for (amount, outcome) in outcomes {
        match outcome {
            Ok(charged) => {
                sold = sold.checked_add(amount).unwrap();
                expected_revenue += charged.value() * amount.as_litres();
            }
            Err(StationError::UnpricedType(FuelType::Diesel)) => unpriced += 1,
            Err(error) => assert!(error.is_rejection(), "unexpected failure: {error}"),
        }
    }

    let metrics = station.metrics();
    assert_eq!(unpriced, 20);
    assert_eq!(
        metrics.sales + metrics.no_capacity_cancellations + metrics.too_expensive_cancellations,
        (requests.len() - unpriced) as u64
    );
    assert_eq!(metrics.too_expensive_cancellations, 20);
    assert!((metrics.revenue - expected_revenue).abs() < EPS);

    let initial: Volume = capacities
        .iter()
        .map(|capacity| litres(*capacity))
        .sum::<Option<Volume>>()
        .unwrap();
    let left: Volume = pumps
        .iter()
        .map(|pump| pump.remaining())
        .sum::<Option<Volume>>()
        .unwrap();
    assert_eq!(initial.checked_sub(left), Some(sold));
    assert!(pumps.iter().all(|pump| pump.overlapping_withdrawals() == 0));
}
