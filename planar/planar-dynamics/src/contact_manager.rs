//! Contact lifecycle: creation from broad-phase pairs, per-step manifold
//! refresh, and destruction on separation.

use hashbrown::HashMap;
use planar_collision::BroadPhase;

use crate::arena::Arena;
use crate::body::{Body, BodyType, ContactEdge};
use crate::contact::{dispatch_order, mix_friction, mix_restitution, Contact};
use crate::events::{ContactFilterHook, ContactListener, ContactView};
use crate::fixture::{Fixture, FixtureId, FixtureProxyKey};
use crate::joints::Joint;

/// Normalized pair key: `(fixture, child)` pairs sorted so the key is
/// independent of dispatch order.
type PairKey = (u32, u32, u32, u32);

fn pair_key(fa: FixtureId, ca: usize, fb: FixtureId, cb: usize) -> PairKey {
    if (fa.0, ca) <= (fb.0, cb) {
        (fa.0, ca as u32, fb.0, cb as u32)
    } else {
        (fb.0, cb as u32, fa.0, ca as u32)
    }
}

/// Owns the broad phase and every live contact.
pub(crate) struct ContactManager {
    pub broad_phase: BroadPhase<FixtureProxyKey>,
    pub contacts: Arena<Contact>,
    /// Fast dedup of existing pairs, keyed independently of order.
    pair_map: HashMap<PairKey, u32>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self {
            broad_phase: BroadPhase::new(),
            contacts: Arena::new(),
            pair_map: HashMap::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the two bodies may collide at all: a joint between them
    /// with `collide_connected = false` suppresses contacts.
    fn bodies_may_collide(
        body_a: &Body,
        body_b_id: crate::body::BodyId,
        joints: &Arena<Joint>,
    ) -> bool {
        for joint_id in body_a.should_collide_connected(body_b_id) {
            if let Some(joint) = joints.get(joint_id.raw()) {
                if !joint.collide_connected() {
                    return false;
                }
            }
        }
        true
    }

    /// Drain the broad phase's moved pairs and create contacts for new
    /// admissible overlaps.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
        filter_hook: &mut dyn ContactFilterHook,
    ) {
        let Self {
            broad_phase,
            contacts,
            pair_map,
        } = self;

        broad_phase.update_pairs(|key_a, key_b| {
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(key_a.fixture.0), fixtures.get(key_b.fixture.0))
            else {
                return;
            };

            let body_a_id = fixture_a.body;
            let body_b_id = fixture_b.body;
            if body_a_id == body_b_id {
                return;
            }

            let key = pair_key(
                key_a.fixture,
                key_a.child_index,
                key_b.fixture,
                key_b.child_index,
            );
            if pair_map.contains_key(&key) {
                return;
            }

            let (Some(body_a), Some(body_b)) =
                (bodies.get(body_a_id.raw()), bodies.get(body_b_id.raw()))
            else {
                return;
            };

            // At least one body must be able to move.
            if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
                return;
            }
            if !body_a.enabled || !body_b.enabled {
                return;
            }
            if !Self::bodies_may_collide(body_a, body_b_id, joints) {
                return;
            }

            if !fixture_a.filter.should_collide(&fixture_b.filter) {
                return;
            }
            if !filter_hook.should_collide(key_a.fixture, key_b.fixture) {
                return;
            }

            // Order the pair for narrow-phase dispatch; edge-edge style
            // pairs never produce a contact.
            let Some(swap) = dispatch_order(
                fixture_a.shape.shape_type(),
                fixture_b.shape.shape_type(),
            ) else {
                return;
            };

            let (fa, ca, fb, cb) = if swap {
                (
                    key_b.fixture,
                    key_b.child_index,
                    key_a.fixture,
                    key_a.child_index,
                )
            } else {
                (
                    key_a.fixture,
                    key_a.child_index,
                    key_b.fixture,
                    key_b.child_index,
                )
            };

            let contact = Contact::new(
                fa,
                ca,
                fb,
                cb,
                mix_friction(fixture_a.friction, fixture_b.friction),
                mix_restitution(fixture_a.restitution, fixture_b.restitution),
            );
            let contact_id = contacts.insert(contact);
            pair_map.insert(key, contact_id);

            if let Some(body_a) = bodies.get_mut(body_a_id.raw()) {
                body_a.contact_edges.push(ContactEdge {
                    other: body_b_id,
                    contact: contact_id,
                });
            }
            if let Some(body_b) = bodies.get_mut(body_b_id.raw()) {
                body_b.contact_edges.push(ContactEdge {
                    other: body_a_id,
                    contact: contact_id,
                });
            }
        });
    }

    /// Refresh every contact: drop the stale ones, update manifolds and
    /// fire begin/end/pre-solve events on the rest.
    pub fn collide(
        &mut self,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
        filter_hook: &mut dyn ContactFilterHook,
        listener: &mut dyn ContactListener,
    ) {
        for contact_id in self.contacts.ids() {
            let Some(contact) = self.contacts.get(contact_id) else {
                continue;
            };
            let (fixture_a_id, fixture_b_id) = (contact.fixture_a, contact.fixture_b);
            let (child_a, child_b) = (contact.child_a, contact.child_b);

            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(fixture_a_id.0), fixtures.get(fixture_b_id.0))
            else {
                continue;
            };
            let body_a_id = fixture_a.body;
            let body_b_id = fixture_b.body;

            // Re-run filtering for contacts whose fixtures changed.
            if contact.filter_pending {
                let keep = {
                    let (Some(body_a), Some(_body_b)) =
                        (bodies.get(body_a_id.raw()), bodies.get(body_b_id.raw()))
                    else {
                        continue;
                    };
                    Self::bodies_may_collide(body_a, body_b_id, joints)
                        && fixture_a.filter.should_collide(&fixture_b.filter)
                        && filter_hook.should_collide(fixture_a_id, fixture_b_id)
                };
                if keep {
                    if let Some(contact) = self.contacts.get_mut(contact_id) {
                        contact.filter_pending = false;
                    }
                } else {
                    self.destroy(contact_id, bodies, fixtures, listener);
                    continue;
                }
            }

            // Sleeping pairs keep their state untouched.
            let (Some(body_a), Some(body_b)) =
                (bodies.get(body_a_id.raw()), bodies.get(body_b_id.raw()))
            else {
                continue;
            };
            let active_a = body_a.awake && body_a.body_type != BodyType::Static;
            let active_b = body_b.awake && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            // Fat AABBs separated: the contact dies; the pair will be
            // re-created if they approach again.
            let proxy_a = fixture_a.proxies[child_a].proxy_id;
            let proxy_b = fixture_b.proxies[child_b].proxy_id;
            if !self.broad_phase.test_overlap(proxy_a, proxy_b) {
                self.destroy(contact_id, bodies, fixtures, listener);
                continue;
            }

            self.update_contact(contact_id, bodies, fixtures, listener);
        }
    }

    /// Recompute one contact's manifold, preserving impulses on matching
    /// points, and fire the lifecycle events.
    pub fn update_contact(
        &mut self,
        contact_id: u32,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        let Some(contact) = self.contacts.get_mut(contact_id) else {
            return;
        };

        let (Some(fixture_a), Some(fixture_b)) = (
            fixtures.get(contact.fixture_a.0),
            fixtures.get(contact.fixture_b.0),
        ) else {
            return;
        };

        let body_a_id = fixture_a.body;
        let body_b_id = fixture_b.body;
        let (Some(body_a), Some(body_b)) =
            (bodies.get(body_a_id.raw()), bodies.get(body_b_id.raw()))
        else {
            return;
        };
        let xf_a = body_a.pose;
        let xf_b = body_b.pose;

        let old_manifold = contact.manifold;
        let was_touching = contact.touching;

        // Re-enable by default; pre-solve may veto below.
        contact.enabled = true;

        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        let touching;
        if sensor {
            touching = planar_collision::test_overlap(
                &fixture_a.shape,
                contact.child_a,
                &fixture_b.shape,
                contact.child_b,
                &xf_a,
                &xf_b,
            );
            // Sensors report but never generate a manifold.
            contact.manifold.point_count = 0;
        } else {
            contact.manifold =
                contact.evaluate(&fixture_a.shape, &xf_a, &fixture_b.shape, &xf_b);
            touching = contact.manifold.point_count > 0;

            // Carry impulses over between matching points.
            for i in 0..contact.manifold.point_count {
                let id = contact.manifold.points[i].id;
                let point = &mut contact.manifold.points[i];
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                for j in 0..old_manifold.point_count {
                    if old_manifold.points[j].id.key() == id.key() {
                        point.normal_impulse = old_manifold.points[j].normal_impulse;
                        point.tangent_impulse = old_manifold.points[j].tangent_impulse;
                        break;
                    }
                }
            }

            if touching != was_touching {
                if let Some(body) = bodies.get_mut(body_a_id.raw()) {
                    body.set_awake(true);
                }
                if let Some(body) = bodies.get_mut(body_b_id.raw()) {
                    body.set_awake(true);
                }
            }
        }

        contact.touching = touching;

        let view = ContactView {
            fixture_a: contact.fixture_a,
            fixture_b: contact.fixture_b,
            child_a: contact.child_a,
            child_b: contact.child_b,
            body_a: body_a_id,
            body_b: body_b_id,
            manifold: contact.manifold,
        };

        if !was_touching && touching {
            listener.begin_contact(&view);
        }
        if was_touching && !touching {
            listener.end_contact(&view);
        }
        if !sensor && touching && !listener.pre_solve(&view, &old_manifold) {
            contact.enabled = false;
        }
    }

    /// Destroy a contact: fire end-contact if it was touching, unlink
    /// the body edges, wake the bodies.
    pub fn destroy(
        &mut self,
        contact_id: u32,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        let Some(contact) = self.contacts.remove(contact_id) else {
            return;
        };

        self.pair_map.remove(&pair_key(
            contact.fixture_a,
            contact.child_a,
            contact.fixture_b,
            contact.child_b,
        ));

        let fixture_a = fixtures.get(contact.fixture_a.0);
        let fixture_b = fixtures.get(contact.fixture_b.0);

        let body_a_id = fixture_a.map(|f| f.body);
        let body_b_id = fixture_b.map(|f| f.body);

        if contact.touching {
            if let (Some(body_a), Some(body_b)) = (body_a_id, body_b_id) {
                listener.end_contact(&ContactView {
                    fixture_a: contact.fixture_a,
                    fixture_b: contact.fixture_b,
                    child_a: contact.child_a,
                    child_b: contact.child_b,
                    body_a,
                    body_b,
                    manifold: contact.manifold,
                });
            }
        }

        let sensor = fixture_a.is_some_and(|f| f.is_sensor)
            || fixture_b.is_some_and(|f| f.is_sensor);
        let wake = contact.manifold.point_count > 0 && !sensor;

        for body_id in [body_a_id, body_b_id].into_iter().flatten() {
            if let Some(body) = bodies.get_mut(body_id.raw()) {
                body.contact_edges.retain(|edge| edge.contact != contact_id);
                if wake {
                    body.set_awake(true);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_order_independent() {
        let a = FixtureId::new(3);
        let b = FixtureId::new(7);
        assert_eq!(pair_key(a, 0, b, 2), pair_key(b, 2, a, 0));
        assert_ne!(pair_key(a, 0, b, 2), pair_key(a, 1, b, 2));
    }
}
