//! The query driver: seeds the rounds, alternates transit and transfer
//! scans, and reconstructs the journey.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::geometry::{great_circle_meters, travel_ms};
use crate::model::{Dataset, Mode, RequestMode};
use crate::routing::journey::{self, Journey, JourneyLeg, LegMode, LegStopover, Place};
use crate::routing::rounds::{LegKind, Rounds, StopArrival};
use crate::routing::transfer::run_transfer_round;
use crate::routing::transit::run_transit_round;
use crate::{Error, TimeMs, VertexId};

/// How many candidate vertices location binding considers per origin.
const ORIGIN_CANDIDATES: usize = 30;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Maximum number of transit legs per journey.
    pub transfer_limit: usize,
    /// Minimum dwell before boarding a trip after arriving at a stop.
    pub transfer_padding_ms: u64,
    /// Speeds in meters per millisecond.
    pub walking_speed: f64,
    pub cycle_speed: f64,
    /// Driving speed cap used when the dataset build derives arc costs.
    pub car_max_speed: f64,
    /// Minimum plausible average driving speed; the A* heuristic divides
    /// by this, so it must not be optimistic.
    pub car_min_avg_speed: f64,
    /// Per-transfer street budgets.
    pub max_walking_ms: u32,
    pub max_cycling_ms: u32,
    /// Cap on the length of stop <-> street stitching arcs.
    pub max_stops_connection_ms: u32,
    /// Wall-clock cap for the unrestricted fallback round.
    pub fallback_time_budget: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            transfer_limit: 4,
            transfer_padding_ms: 3 * 60 * 1000,
            walking_speed: 0.8 / 1000.0,
            cycle_speed: 4.0 / 1000.0,
            car_max_speed: 36.0 / 1000.0,
            car_min_avg_speed: 8.0 / 1000.0,
            max_walking_ms: 15 * 60 * 1000,
            max_cycling_ms: 30 * 60 * 1000,
            max_stops_connection_ms: 5 * 60 * 1000,
            fallback_time_budget: Duration::from_secs(10),
        }
    }
}

/// A free-form geographic request endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub origin: Location,
    pub destination: Location,
    /// Absolute departure in ms since the Unix epoch.
    pub departure: TimeMs,
    pub mode: RequestMode,
}

/// The journey planner. Holds the shared immutable dataset; every query
/// additionally needs exclusive access to one [`Rounds`] instance.
#[derive(Debug, Clone)]
pub struct Planner {
    data: Arc<Dataset>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(data: Arc<Dataset>, config: PlannerConfig) -> Self {
        Planner { data, config }
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// A [`Rounds`] instance sized for this planner's transfer limit.
    pub fn new_rounds(&self) -> Rounds {
        Rounds::new(self.config.transfer_limit)
    }

    /// Computes an earliest-arrival journey for the request and grafts
    /// the requested coordinates onto its endpoints.
    pub fn route(&self, rounds: &mut Rounds, request: &RouteRequest) -> Result<Journey, Error> {
        validate_location("origin", &request.origin)?;
        validate_location("destination", &request.destination)?;

        let street_mode = request.mode.street_mode();
        let origins = self.bind_origin(&request.origin, street_mode)?;
        let destination = self.bind_destination(&request.destination, street_mode)?;

        let mut journey = match request.mode {
            RequestMode::Transit => {
                self.route_transit(rounds, &origins, destination, request.departure)?
            }
            _ => self.route_street(
                rounds,
                &origins,
                destination,
                request.departure,
                street_mode,
            )?,
        };

        self.attach_endpoints(&mut journey, request);
        Ok(journey)
    }

    /// Transit search over pre-bound origin vertices: alternates RAPTOR
    /// and foot transfer rounds up to the transfer limit, then falls back
    /// to one unrestricted transfer round if the destination was missed.
    pub fn route_transit(
        &self,
        rounds: &mut Rounds,
        origins: &[VertexId],
        destination: VertexId,
        departure: TimeMs,
    ) -> Result<Journey, Error> {
        let data = &self.data;
        rounds.ensure_rounds(Rounds::rounds_for_limit(self.config.transfer_limit));
        rounds.new_session();

        self.seed(rounds, origins, departure, Mode::Foot);
        rounds.marked_stops.extend(origins.iter().copied());

        let started = Instant::now();
        let mut last_round = 0;

        for k in 0..=self.config.transfer_limit {
            let index = k * 2;
            run_transit_round(
                data,
                rounds,
                destination,
                index,
                self.config.transfer_padding_ms,
            );

            // The origins take part in the very first transfer round even
            // if no trip improved them.
            if k == 0 {
                rounds.marked_stops.extend(origins.iter().copied());
            }

            rounds
                .marked_stops_for_transfer
                .extend(rounds.marked_stops.iter().copied());
            run_transfer_round(
                data,
                &self.config,
                rounds,
                destination,
                index + 1,
                Mode::Foot,
                false,
                None,
            );

            if rounds.marked_stops.is_empty() {
                break;
            }
            last_round = index + 2;
        }

        if !rounds.earliest_arrivals.contains_key(&destination) {
            // One more transfer round without the walking budget, seeded
            // from everything reached so far, capped by wall time.
            let reached: Vec<VertexId> = rounds.earliest_arrivals.keys().copied().collect();
            rounds.marked_stops_for_transfer.extend(reached);
            let deadline = Instant::now() + self.config.fallback_time_budget;
            let completed = run_transfer_round(
                data,
                &self.config,
                rounds,
                destination,
                last_round,
                Mode::Foot,
                true,
                Some(deadline),
            );
            if !completed {
                log::debug!("unrestricted fallback round expired before draining");
            }
            last_round += 1;
        }

        if !rounds.earliest_arrivals.contains_key(&destination) {
            return Err(Error::NoRoute);
        }

        log::debug!(
            "transit query settled in {:?}, {} vertices reached",
            started.elapsed(),
            rounds.earliest_arrivals.len(),
        );

        journey::reconstruct(data, rounds, destination, last_round)
    }

    /// Pure street search over pre-bound origin vertices: one unbudgeted
    /// transfer round of the chosen mode.
    pub fn route_street(
        &self,
        rounds: &mut Rounds,
        origins: &[VertexId],
        destination: VertexId,
        departure: TimeMs,
        mode: Mode,
    ) -> Result<Journey, Error> {
        rounds.ensure_rounds(Rounds::rounds_for_limit(self.config.transfer_limit));
        rounds.new_session();

        self.seed(rounds, origins, departure, mode);
        rounds
            .marked_stops_for_transfer
            .extend(origins.iter().copied());

        run_transfer_round(
            &self.data,
            &self.config,
            rounds,
            destination,
            0,
            mode,
            true,
            None,
        );

        if !rounds.earliest_arrivals.contains_key(&destination) {
            return Err(Error::NoRoute);
        }

        journey::reconstruct(&self.data, rounds, destination, 1)
    }

    fn seed(&self, rounds: &mut Rounds, origins: &[VertexId], departure: TimeMs, mode: Mode) {
        for &origin in origins {
            rounds.rounds[0].insert(
                origin,
                StopArrival {
                    arrival: departure,
                    leg: LegKind::Origin,
                    enter_key: 0,
                    departure: 0,
                    transfer_time: 0,
                    vehicles: mode.bit(),
                },
            );
            rounds.earliest_arrivals.insert(origin, departure);
        }
    }

    /// Candidate origin vertices near a location, best first. Worse seeds
    /// are discarded by target pruning during the search.
    fn bind_origin(&self, location: &Location, mode: Mode) -> Result<Vec<VertexId>, Error> {
        let candidates = self.data.vertex_trees.nearest(
            mode,
            location.latitude,
            location.longitude,
            ORIGIN_CANDIDATES,
        );
        if candidates.is_empty() {
            return Err(Error::NoOriginMatch);
        }
        Ok(candidates)
    }

    fn bind_destination(&self, location: &Location, mode: Mode) -> Result<VertexId, Error> {
        self.data
            .vertex_trees
            .nearest(mode, location.latitude, location.longitude, 1)
            .first()
            .copied()
            .ok_or(Error::NoDestinationMatch)
    }

    /// Grafts the requested coordinates onto the journey: street legs are
    /// extended in place with a synthetic stopover, transit legs get a
    /// synthetic walking leg.
    fn attach_endpoints(&self, journey: &mut Journey, request: &RouteRequest) {
        if journey.legs.is_empty() {
            return;
        }
        self.attach_destination(journey, &request.destination);
        self.attach_origin(journey, &request.origin);
    }

    fn attach_origin(&self, journey: &mut Journey, origin: &Location) {
        let Some(first) = journey.legs.first_mut() else {
            return;
        };
        let distance = great_circle_meters(
            origin.latitude,
            origin.longitude,
            first.origin.latitude,
            first.origin.longitude,
        );
        let place = Place {
            vertex: None,
            latitude: origin.latitude,
            longitude: origin.longitude,
            stop: None,
        };

        match first.mode {
            LegMode::Walking | LegMode::Cycling | LegMode::Driving => {
                let duration = travel_ms(distance, self.leg_speed(first.mode));
                let departure = first.departure.saturating_sub(duration);
                if let Some(head) = first.stopovers.first_mut() {
                    head.arrival = Some(first.departure);
                }
                first.stopovers.insert(
                    0,
                    LegStopover {
                        place: place.clone(),
                        arrival: None,
                        departure: Some(departure),
                    },
                );
                first.origin = place;
                first.departure = departure;
            }
            LegMode::Transit => {
                // Leave padding to reach the boarding stop in time.
                let walk = travel_ms(distance, self.config.walking_speed)
                    + self.config.transfer_padding_ms;
                let arrival = first.departure.saturating_sub(self.config.transfer_padding_ms);
                let departure = first.departure.saturating_sub(walk);
                let boarding = first.origin.clone();
                journey.legs.insert(
                    0,
                    walking_leg(place, boarding, departure, arrival),
                );
            }
        }
    }

    fn attach_destination(&self, journey: &mut Journey, destination: &Location) {
        let Some(last) = journey.legs.last_mut() else {
            return;
        };
        let distance = great_circle_meters(
            last.destination.latitude,
            last.destination.longitude,
            destination.latitude,
            destination.longitude,
        );
        let place = Place {
            vertex: None,
            latitude: destination.latitude,
            longitude: destination.longitude,
            stop: None,
        };

        match last.mode {
            LegMode::Walking | LegMode::Cycling | LegMode::Driving => {
                let duration = travel_ms(distance, self.leg_speed(last.mode));
                let arrival = last.arrival + duration;
                if let Some(tail) = last.stopovers.last_mut() {
                    tail.departure = Some(last.arrival);
                }
                last.stopovers.push(LegStopover {
                    place: place.clone(),
                    arrival: Some(arrival),
                    departure: None,
                });
                last.destination = place;
                last.arrival = arrival;
            }
            LegMode::Transit => {
                let duration = travel_ms(distance, self.config.walking_speed);
                let departure = last.arrival;
                let alighting = last.destination.clone();
                let arrival = departure + duration;
                journey
                    .legs
                    .push(walking_leg(alighting, place, departure, arrival));
            }
        }
    }

    fn leg_speed(&self, mode: LegMode) -> f64 {
        match mode {
            LegMode::Cycling => self.config.cycle_speed,
            LegMode::Driving => self.config.car_min_avg_speed,
            _ => self.config.walking_speed,
        }
    }
}

fn walking_leg(origin: Place, destination: Place, departure: TimeMs, arrival: TimeMs) -> JourneyLeg {
    JourneyLeg {
        mode: LegMode::Walking,
        stopovers: vec![
            LegStopover {
                place: origin.clone(),
                arrival: None,
                departure: Some(departure),
            },
            LegStopover {
                place: destination.clone(),
                arrival: Some(arrival),
                departure: None,
            },
        ],
        origin,
        destination,
        departure,
        arrival,
        line: None,
    }
}

fn validate_location(role: &str, location: &Location) -> Result<(), Error> {
    if !location.latitude.is_finite() || !location.longitude.is_finite() {
        return Err(Error::InvalidLocation(format!(
            "{role} coordinates are not finite"
        )));
    }
    if location.latitude == 0.0 && location.longitude == 0.0 {
        return Err(Error::InvalidLocation(format!(
            "{role} has zero-magnitude coordinates"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_magnitude_locations_are_rejected() {
        let zero = Location {
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(matches!(
            validate_location("origin", &zero),
            Err(Error::InvalidLocation(_))
        ));
        let nan = Location {
            latitude: f64::NAN,
            longitude: 11.0,
        };
        assert!(matches!(
            validate_location("destination", &nan),
            Err(Error::InvalidLocation(_))
        ));
        let ok = Location {
            latitude: 48.0,
            longitude: 11.0,
        };
        assert!(validate_location("origin", &ok).is_ok());
    }
}
