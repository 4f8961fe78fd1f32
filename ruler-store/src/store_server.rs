//! The gRPC side of C8: exposes the local TSDB as a Store node. Every series
//! returned carries L_ext merged in (ext wins), and `Info` always reports
//! component type "RULER" — this is the mechanism by which other Thanos
//! components discover and query data the Ruler itself produced.

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::proto::thanos_ruler::store::store_server::Store;
use crate::proto::thanos_ruler::store::{
	InfoRequest, InfoResponse, Label, LabelNamesRequest, LabelNamesResponse, LabelValuesRequest,
	LabelValuesResponse, Sample, Series, SeriesRequest, SeriesResponse,
};
use crate::tsdb::{Matcher, Tsdb};

pub struct StoreService {
	tsdb: Arc<Tsdb>,
}

impl StoreService {
	pub fn new(tsdb: Arc<Tsdb>) -> Self {
		Self { tsdb }
	}
}

#[tonic::async_trait]
impl Store for StoreService {
	async fn info(&self, _request: Request<InfoRequest>) -> Result<Response<InfoResponse>, Status> {
		let labels = self
			.tsdb
			.external_labels()
			.iter()
			.map(|l| Label {
				name: l.name.clone(),
				value: l.value.clone(),
			})
			.collect();
		Ok(Response::new(InfoResponse {
			labels,
			min_time: self.tsdb.min_time(),
			max_time: self.tsdb.max_time(),
			component_type: "RULER".to_string(),
		}))
	}

	type SeriesStream = ReceiverStream<Result<SeriesResponse, Status>>;

	async fn series(
		&self,
		request: Request<SeriesRequest>,
	) -> Result<Response<Self::SeriesStream>, Status> {
		let req = request.into_inner();
		let matchers: Vec<Matcher> = req
			.matchers
			.into_iter()
			.map(|m| Matcher {
				name: m.name,
				value: m.value,
			})
			.collect();
		let series = self.tsdb.select(&matchers, req.min_time, req.max_time);

		let (tx, rx) = tokio::sync::mpsc::channel(16);
		tokio::spawn(async move {
			for s in series {
				let labels = s
					.labels
					.iter()
					.map(|l| Label {
						name: l.name.clone(),
						value: l.value.clone(),
					})
					.collect();
				let samples = s
					.samples
					.into_iter()
					.map(|(timestamp, value)| Sample { timestamp, value })
					.collect();
				let msg = SeriesResponse {
					series: Some(Series { labels, samples }),
				};
				if tx.send(Ok(msg)).await.is_err() {
					return;
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}

	async fn label_names(
		&self,
		request: Request<LabelNamesRequest>,
	) -> Result<Response<LabelNamesResponse>, Status> {
		let req = request.into_inner();
		let names = self.tsdb.label_names(req.min_time, req.max_time);
		Ok(Response::new(LabelNamesResponse { names }))
	}

	async fn label_values(
		&self,
		request: Request<LabelValuesRequest>,
	) -> Result<Response<LabelValuesResponse>, Status> {
		let req = request.into_inner();
		let values = self.tsdb.label_values(&req.label, req.min_time, req.max_time);
		Ok(Response::new(LabelValuesResponse { values }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ruler_core::Labels;
	use std::time::Duration;

	fn service(dir: &std::path::Path) -> StoreService {
		let tsdb = Tsdb::open(
			dir,
			Labels::from_pairs([("replica", "A")]),
			Duration::from_secs(7200),
			Duration::from_secs(3600 * 48),
		)
		.unwrap();
		let mut app = tsdb.appender();
		app.append(Labels::from_pairs([("__name__", "up")]), 1000, 1.0);
		app.commit().unwrap();
		StoreService::new(Arc::new(tsdb))
	}

	#[tokio::test]
	async fn info_reports_ruler_component_type() {
		let dir = tempfile::tempdir().unwrap();
		let svc = service(dir.path());
		let resp = svc.info(Request::new(InfoRequest {})).await.unwrap();
		assert_eq!(resp.get_ref().component_type, "RULER");
	}

	#[tokio::test]
	async fn label_names_includes_external_labels() {
		let dir = tempfile::tempdir().unwrap();
		let svc = service(dir.path());
		let resp = svc
			.label_names(Request::new(LabelNamesRequest {
				min_time: 0,
				max_time: 2000,
			}))
			.await
			.unwrap();
		assert!(resp.get_ref().names.contains(&"replica".to_string()));
	}
}
