// We don't control the codegen, so disable any code warnings in the proto
// module.
#[allow(warnings)]
#[allow(clippy::derive_partial_eq_without_eq)]
pub mod thanos_ruler {
	pub mod store {
		tonic::include_proto!("thanos_ruler.store");
	}
}
